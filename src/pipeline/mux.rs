//! Mux synchronizer
//!
//! Sits between the encoder and the shared container writer. Registers the
//! output track once and keeps presentation times non-decreasing: a frame
//! stamped earlier than the last written one gets an estimated time instead.

use log::{debug, info, warn};

use crate::engine::container::SharedWriter;
use crate::engine::format::{BufferInfo, MediaFormat};
use crate::error::{ClipError, Result};

/// Encoder frame size assumed for timestamp estimates
///
/// This matches common AAC encoders and is only a heuristic. Sessions whose
/// encoder frames differ should set `samples_per_frame` in the config.
pub const DEFAULT_SAMPLES_PER_FRAME: u32 = 1024;

/// One encoded frame on its way to the container
#[derive(Debug, Clone, Copy)]
pub struct EncodedFrame<'a> {
    pub data: &'a [u8],
    pub info: BufferInfo,
}

impl EncodedFrame<'_> {
    pub fn presentation_time_us(&self) -> i64 {
        self.info.presentation_time_us
    }
}

/// Serializes one pipeline's frames into a shared container track
pub struct MuxSynchronizer {
    writer: SharedWriter,
    track_index: Option<usize>,
    sample_rate: u32,
    samples_per_frame: u32,
    last_written_us: i64,
    last_estimated_us: i64,
    frames_written: u64,
    frames_repaired: u64,
}

impl MuxSynchronizer {
    pub fn new(writer: SharedWriter, sample_rate: u32, samples_per_frame: u32) -> Self {
        MuxSynchronizer {
            writer,
            track_index: None,
            sample_rate,
            samples_per_frame,
            last_written_us: 0,
            last_estimated_us: 0,
            frames_written: 0,
            frames_repaired: 0,
        }
    }

    /// Track assigned by the container, once the encoder reported its format
    pub fn track_index(&self) -> Option<usize> {
        self.track_index
    }

    pub fn is_ready(&self) -> bool {
        self.track_index.is_some()
    }

    pub fn last_written_us(&self) -> i64 {
        self.last_written_us
    }

    pub fn last_estimated_us(&self) -> i64 {
        self.last_estimated_us
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Frames whose timestamp had to be replaced
    pub fn frames_repaired(&self) -> u64 {
        self.frames_repaired
    }

    /// Duration of one frame under the frame size assumption
    pub fn frame_duration_us(&self) -> i64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples_per_frame as i64 * 1_000_000 / self.sample_rate as i64
    }

    /// Register the output track. Later calls keep the first track.
    pub fn add_track(&mut self, format: &MediaFormat) -> Result<usize> {
        if let Some(index) = self.track_index {
            warn!("[MUX] Output format reported again; keeping track {}", index);
            return Ok(index);
        }
        let index = {
            let mut writer = self.writer.lock().map_err(|_| ClipError::WriterPoisoned)?;
            writer.add_track(format)?
        };
        self.track_index = Some(index);
        info!("[MUX] Added {} track {}", format.mime, index);
        Ok(index)
    }

    /// Write one frame, repairing its time if it would go backwards
    ///
    /// Returns the presentation time actually written.
    pub fn write(&mut self, frame: EncodedFrame<'_>) -> Result<i64> {
        let track = self.track_index.ok_or_else(|| {
            ClipError::codec("encoder", "produced a frame before its output format")
        })?;

        let mut info = frame.info;
        if info.presentation_time_us < self.last_written_us {
            debug!(
                "[MUX] Repairing pts {}us (last written {}us) -> {}us",
                info.presentation_time_us, self.last_written_us, self.last_estimated_us
            );
            info.presentation_time_us = self.last_estimated_us;
            self.frames_repaired += 1;
        }

        {
            let mut writer = self.writer.lock().map_err(|_| ClipError::WriterPoisoned)?;
            writer.write_sample(track, frame.data, &info)?;
        }

        self.last_written_us = info.presentation_time_us;
        self.last_estimated_us = self.last_written_us + self.frame_duration_us();
        self.frames_written += 1;
        Ok(info.presentation_time_us)
    }
}
