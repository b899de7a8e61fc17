//! Pipeline configuration
//!
//! Everything a session needs besides its engines: the time window, fade
//! length, encoder overrides and an optional loop plan. Loaded from JSON;
//! every field has a default.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ClipError, Result};
use crate::pipeline::mux::DEFAULT_SAMPLES_PER_FRAME;

/// Optional overrides for the encoder output format
///
/// Unset fields fall back to the source track, then to built-in defaults.
/// An unset `mime` means AAC, which needs an AAC encode engine: the bundled
/// `PcmCodec` only accepts `audio/raw` and rejects the default with
/// `UnsupportedFormat`.
///
/// `sample_rate` and `channel_count` must match the decoded PCM when set.
/// PCM reaches the encoder unconverted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderTarget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_count: Option<u16>,
}

/// Repeat the source window until a target length is filled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Total length of the output
    pub target_duration_us: i64,
    /// Length of source audio played per pass, starting at 0
    pub loop_length_us: i64,
    /// Fade at the end of every pass but the last
    #[serde(default)]
    pub loop_fade_us: i64,
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub start_time_us: i64,
    /// Window end; `None` means the end of the track
    pub end_time_us: Option<i64>,
    pub fade_duration_us: i64,
    pub target: EncoderTarget,
    /// Encoder frame size assumed when repairing timestamps
    pub samples_per_frame: u32,
    pub looping: Option<LoopConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            start_time_us: 0,
            end_time_us: None,
            fade_duration_us: 0,
            target: EncoderTarget::default(),
            samples_per_frame: DEFAULT_SAMPLES_PER_FRAME,
            looping: None,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file
    ///
    /// # Errors
    /// * `FileNotFound` - If the file does not exist
    /// * `Serialization` - If the JSON does not describe a configuration
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ClipError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let reader = BufReader::new(File::open(path)?);
        let config: PipelineConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn with_window(mut self, start_time_us: i64, end_time_us: Option<i64>) -> Self {
        self.start_time_us = start_time_us;
        self.end_time_us = end_time_us;
        self
    }

    pub fn with_fade(mut self, fade_duration_us: i64) -> Self {
        self.fade_duration_us = fade_duration_us;
        self
    }

    pub fn with_target(mut self, target: EncoderTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_looping(mut self, looping: LoopConfig) -> Self {
        self.looping = Some(looping);
        self
    }

    /// Reject values no session can run with
    ///
    /// Window bounds are not checked here: they are clamped to the track
    /// duration, and only then compared.
    pub fn validate(&self) -> Result<()> {
        if self.fade_duration_us < 0 {
            return Err(config_error(format!(
                "fade duration must not be negative, got {}us",
                self.fade_duration_us
            )));
        }
        if self.samples_per_frame == 0 {
            return Err(config_error("samples_per_frame must be positive"));
        }
        if self.target.sample_rate == Some(0) {
            return Err(config_error("target sample rate must be positive"));
        }
        if self.target.channel_count == Some(0) {
            return Err(config_error("target channel count must be positive"));
        }
        if self.target.bit_rate == Some(0) {
            return Err(config_error("target bit rate must be positive"));
        }
        if let Some(looping) = &self.looping {
            if looping.target_duration_us <= 0 || looping.loop_length_us <= 0 {
                return Err(config_error(format!(
                    "loop durations must be positive, got target {}us and loop {}us",
                    looping.target_duration_us, looping.loop_length_us
                )));
            }
            if looping.loop_fade_us < 0 {
                return Err(config_error("loop fade must not be negative"));
            }
        }
        Ok(())
    }
}

fn config_error(reason: impl Into<String>) -> ClipError {
    ClipError::Config {
        reason: reason.into(),
    }
}
