//! Codec engine interface
//!
//! One trait covers both decode and encode engines. It is buffer oriented
//! and never blocks: every dequeue returns immediately, and "nothing yet" is
//! an ordinary result. Engines that expose buffers differently per platform
//! hide that behind their own `input_buffer`/`output_buffer`.

use crate::engine::format::{BufferInfo, MediaFormat, OutputStatus};
use crate::error::Result;

/// Whether a codec is configured to decode or to encode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecRole {
    Decoder,
    Encoder,
}

impl CodecRole {
    /// Label used in logs and error messages
    pub fn label(self) -> &'static str {
        match self {
            CodecRole::Decoder => "decoder",
            CodecRole::Encoder => "encoder",
        }
    }
}

/// A non-blocking, buffer-slot based codec session
pub trait Codec: Send {
    /// Configure the session. Must precede `start`.
    fn configure(&mut self, format: &MediaFormat, role: CodecRole) -> Result<()>;

    fn start(&mut self) -> Result<()>;

    /// Drop every queued input and pending output, keeping the configuration
    fn flush(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Free the engine. No other call is valid afterwards.
    fn release(&mut self);

    /// Index of a free input slot, if one is available right now
    fn dequeue_input_buffer(&mut self) -> Option<usize>;

    /// Writable memory of a dequeued input slot
    fn input_buffer(&mut self, index: usize) -> Result<&mut [u8]>;

    /// Hand a filled input slot to the engine
    fn queue_input_buffer(&mut self, index: usize, info: BufferInfo) -> Result<()>;

    /// Poll for output without waiting
    fn dequeue_output_buffer(&mut self) -> OutputStatus;

    /// Readable memory of a dequeued output buffer
    fn output_buffer(&self, index: usize) -> Result<&[u8]>;

    /// Give a dequeued output buffer back to the engine
    fn release_output_buffer(&mut self, index: usize) -> Result<()>;

    /// Current output format, known after `OutputStatus::FormatChanged`
    fn output_format(&self) -> Option<MediaFormat>;
}
