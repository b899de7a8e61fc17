//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::fs;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::cli::ProcessArgs;
use crate::config::{LoopConfig, PipelineConfig};
use crate::engine::container::shared;
use crate::engine::format::{MediaFormat, MIME_AUDIO_RAW};
use crate::engine::io::{WavContainer, WavSource};
use crate::engine::pcm::PcmCodec;
use crate::engine::source::MediaSource;
use crate::error::{ClipError, Result};
use crate::pipeline::{AudioPipeline, TimeWindow, TrackInfo};

/// Summary printed after a `process` run
#[derive(Debug, Clone, Serialize)]
pub struct ProcessReport {
    pub session_id: String,
    pub input: String,
    pub output: String,
    pub source: TrackInfo,
    pub window: TimeWindow,
    pub fade_duration_us: i64,
    pub loop_passes: usize,
    pub frames_written: u64,
    pub frames_repaired: u64,
    pub samples_written: u64,
    pub output_sha256: String,
    pub completed_at: DateTime<Utc>,
}

/// Merge the config file (if any) with command-line overrides
pub fn resolve_config(args: &ProcessArgs, duration_us: i64) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(start_us) = args.start_us {
        config.start_time_us = start_us;
    }
    if args.end_us.is_some() {
        config.end_time_us = args.end_us;
    }
    if let Some(fade_us) = args.fade_us {
        config.fade_duration_us = fade_us;
    }
    if args.bit_rate.is_some() {
        config.target.bit_rate = args.bit_rate;
    }
    if let Some(target_duration_us) = args.loop_duration_us {
        config.looping = Some(LoopConfig {
            target_duration_us,
            loop_length_us: config.end_time_us.unwrap_or(duration_us),
            loop_fade_us: args.loop_fade_us.unwrap_or(0),
        });
    }

    // A WAV container only stores raw PCM
    match config.target.mime.as_deref() {
        None => config.target.mime = Some(MIME_AUDIO_RAW.to_string()),
        Some(MIME_AUDIO_RAW) => {}
        Some(other) => {
            return Err(ClipError::UnsupportedFormat {
                format: format!("{} output to a WAV file", other),
            })
        }
    }

    config.validate()?;
    Ok(config)
}

/// Trim, fade and re-encode a WAV file.
pub fn process(args: &ProcessArgs) -> Result<ProcessReport> {
    info!(
        "Processing {} -> {}",
        args.input.display(),
        args.output.display()
    );

    let source = WavSource::open(&args.input)?;
    let duration_us = source
        .track_format(0)?
        .duration_us
        .ok_or(ClipError::MissingDuration)?;
    let config = resolve_config(args, duration_us)?;

    let container = WavContainer::create(&args.output);
    let writer = shared(container);

    let mut pipeline = AudioPipeline::new(
        Box::new(source),
        Box::new(PcmCodec::new()),
        Box::new(PcmCodec::new()),
        writer.clone(),
        &config,
    )?;

    let track = pipeline.run_until_ready()?;
    info!("Output track {} ready", track);
    writer
        .lock()
        .map_err(|_| ClipError::WriterPoisoned)?
        .start()?;

    let run = pipeline.run_to_completion();
    let window = *pipeline.window();
    let source = pipeline.track_info().clone();
    let fade_duration_us = pipeline.fade().fade_duration_us();
    let loop_passes = pipeline.loop_plan().map_or(1, |plan| plan.segments().len());
    let frames_written = pipeline.mux().frames_written();
    let frames_repaired = pipeline.mux().frames_repaired();
    let session_id = pipeline.id();
    pipeline.stop();

    {
        let mut guard = writer.lock().map_err(|_| ClipError::WriterPoisoned)?;
        if run.is_ok() {
            guard.stop()?;
        }
        guard.release();
    }
    run?;

    if frames_repaired > 0 {
        warn!("{} frame timestamps were repaired", frames_repaired);
    }

    let samples_written = wav_sample_count(&args.output)?;
    let report = ProcessReport {
        session_id: session_id.to_string(),
        input: args.input.display().to_string(),
        output: args.output.display().to_string(),
        source,
        window,
        fade_duration_us,
        loop_passes,
        frames_written,
        frames_repaired,
        samples_written,
        output_sha256: file_sha256(&args.output)?,
        completed_at: Utc::now(),
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report)
}

/// Print the audio track format of a WAV file.
pub fn probe(input: &Path) -> Result<MediaFormat> {
    info!("Probing {}", input.display());

    let source = WavSource::open(input)?;
    let format = source.track_format(0)?;

    println!("{}", serde_json::to_string_pretty(&format)?);
    Ok(format)
}

fn wav_sample_count(path: &Path) -> Result<u64> {
    let reader = hound::WavReader::open(path)?;
    Ok(reader.len() as u64)
}

/// Calculate SHA-256 checksum of a file
fn file_sha256(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
