//! Demuxer interface
//!
//! A `MediaSource` exposes the tracks of an opened container and hands out
//! the compressed (or raw) samples of one selected track in decode order.

use crate::engine::format::{BufferFlags, MediaFormat, SeekMode};
use crate::error::Result;

/// Sample-level access to one opened media container
pub trait MediaSource: Send {
    /// Number of elementary streams in the container
    fn track_count(&self) -> usize;

    /// Format of the track at `index`
    fn track_format(&self, index: usize) -> Result<MediaFormat>;

    /// Restrict `read_sample` and friends to the track at `index`
    fn select_track(&mut self, index: usize) -> Result<()>;

    /// Move to the sync sample nearest to `time_us` according to `mode`
    fn seek_to(&mut self, time_us: i64, mode: SeekMode) -> Result<()>;

    /// Copy the current sample into `buf`
    ///
    /// Returns `Ok(None)` once the selected track has no more samples. The
    /// read position does not move until `advance` is called.
    fn read_sample(&mut self, buf: &mut [u8]) -> Result<Option<usize>>;

    /// Presentation time of the current sample, `None` at end of track
    fn sample_time(&self) -> Option<i64>;

    /// Flags of the current sample
    fn sample_flags(&self) -> BufferFlags;

    /// Move to the next sample. Returns false at end of track.
    fn advance(&mut self) -> bool;

    /// Release the underlying container. Further calls are invalid.
    fn release(&mut self);
}

/// Index of the first track whose mime type marks it as audio
pub fn find_audio_track(source: &dyn MediaSource) -> Result<Option<usize>> {
    for index in 0..source.track_count() {
        if source.track_format(index)?.is_audio() {
            return Ok(Some(index));
        }
    }
    Ok(None)
}
