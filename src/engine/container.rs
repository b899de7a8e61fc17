//! Container writer interface
//!
//! The writer is owned outside the pipeline and may be fed by several
//! pipelines at once (one audio, one video). It is therefore always handled
//! through [`SharedWriter`] and locked for exactly one call at a time.

use std::sync::{Arc, Mutex};

use crate::engine::format::{BufferInfo, MediaFormat};
use crate::error::Result;

/// Sink for the encoded samples of one or more tracks
pub trait ContainerWriter: Send {
    /// Register a track and return its index
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize>;

    /// Begin writing. All tracks must be added first.
    fn start(&mut self) -> Result<()>;

    /// Write one sample. Timestamps must not decrease within a track.
    fn write_sample(&mut self, track_index: usize, data: &[u8], info: &BufferInfo) -> Result<()>;

    /// Finish the container
    fn stop(&mut self) -> Result<()>;

    /// Free the writer. Stops it first if needed.
    fn release(&mut self);
}

/// A container writer shared between pipelines
pub type SharedWriter = Arc<Mutex<dyn ContainerWriter>>;

/// Wrap a writer so it can be shared between pipelines
pub fn shared<W: ContainerWriter + 'static>(writer: W) -> SharedWriter {
    Arc::new(Mutex::new(writer))
}
