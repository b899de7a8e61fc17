//! Audioclip - Windowed Audio Transcoding
//!
//! Takes the audio track of a media source, decodes the part inside a time
//! window, fades out its tail, re-encodes it and writes the encoded frames
//! to a container track with non-decreasing timestamps.
//!
//! # Architecture
//!
//! Data flows downstream through four stages:
//! - Decode driver: source samples in, windowed PCM out
//! - Fade processor: linear gain ramp over the window tail
//! - Encode driver: PCM in, encoded frames out
//! - Mux synchronizer: timestamp repair and locked writes to a shared writer
//!
//! Control flows upstream: each [`AudioPipeline::run_step`] asks the encoder
//! for work, which pulls from the decoder only when it has a free input slot.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;

pub use config::{EncoderTarget, LoopConfig, PipelineConfig};
pub use error::{ClipError, Result};
pub use pipeline::{AudioPipeline, InputExhaustedListener, PipelineState, StepOutcome};
