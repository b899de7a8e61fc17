//! Decode driver
//!
//! Owns one source and one decode engine. `step` makes one non-blocking
//! attempt to move data through the engine and hands back PCM that has
//! already been cut to the time window.
//!
//! State machine: Idle -> Started -> Producing <-> Draining -> Finished.

use std::fmt;

use log::{debug, info, warn};
use serde::Serialize;

use crate::engine::codec::{Codec, CodecRole};
use crate::engine::format::{BufferFlags, BufferInfo, MediaFormat, OutputStatus, SeekMode};
use crate::engine::source::{find_audio_track, MediaSource};
use crate::error::{ClipError, Result};
use crate::pipeline::units::PcmUnits;
use crate::pipeline::window::TimeWindow;
use crate::pipeline::{DEFAULT_CHANNEL_COUNT, DEFAULT_SAMPLE_RATE};

/// Read-only description of the selected source track
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackInfo {
    pub mime: String,
    pub sample_rate: Option<u32>,
    pub channel_count: Option<u16>,
    pub bit_rate: Option<u32>,
    pub duration_us: i64,
}

impl TrackInfo {
    /// Derive track info from a source format
    ///
    /// Non-positive values are treated as unreported.
    pub fn from_format(format: &MediaFormat) -> Result<Self> {
        let duration_us = format
            .duration_us
            .filter(|d| *d >= 0)
            .ok_or(ClipError::MissingDuration)?;
        Ok(TrackInfo {
            mime: format.mime.clone(),
            sample_rate: format.sample_rate.filter(|r| *r > 0),
            channel_count: format.channel_count.filter(|c| *c > 0),
            bit_rate: format.bit_rate.filter(|b| *b > 0),
            duration_us,
        })
    }

    /// PCM layout of the decoded stream
    pub fn pcm_units(&self) -> PcmUnits {
        PcmUnits::new(
            self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE),
            self.channel_count.unwrap_or(DEFAULT_CHANNEL_COUNT),
        )
    }
}

/// Lifecycle of the decode driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderState {
    /// Configured, not yet started
    #[default]
    Idle,
    /// Started or restarted; nothing pushed yet
    Started,
    /// Source samples are still being pushed
    Producing,
    /// All input pushed; pulling the remaining output
    Draining,
    /// The engine reported end of stream
    Finished,
    /// Engine and source have been released
    Released,
}

impl fmt::Display for DecoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecoderState::Idle => write!(f, "Idle"),
            DecoderState::Started => write!(f, "Started"),
            DecoderState::Producing => write!(f, "Producing"),
            DecoderState::Draining => write!(f, "Draining"),
            DecoderState::Finished => write!(f, "Finished"),
            DecoderState::Released => write!(f, "Released"),
        }
    }
}

/// A decoded output buffer, already cut to the time window
///
/// The bytes stay inside the engine; read them with
/// [`AudioDecoder::bytes`]. The handle must be given back exactly once with
/// [`AudioDecoder::release`], which consumes it.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "decoded buffers must be released back to the decoder"]
pub struct DecodedBuffer {
    index: usize,
    position: usize,
    limit: usize,
    offset: usize,
    size: usize,
    presentation_time_us: i64,
    flags: BufferFlags,
}

impl DecodedBuffer {
    /// Engine slot this buffer occupies
    pub fn index(&self) -> usize {
        self.index
    }

    /// Windowed bytes left to consume
    pub fn len(&self) -> usize {
        self.limit - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start of the remaining bytes inside the engine buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// End of the windowed bytes inside the engine buffer
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Offset and size as reported by the engine, before windowing
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn presentation_time_us(&self) -> i64 {
        self.presentation_time_us
    }

    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.flags.is_end_of_stream()
    }

    /// Mark `bytes` of the remaining data as consumed
    pub(crate) fn consume(&mut self, bytes: usize) {
        self.position = (self.position + bytes).min(self.limit);
    }
}

/// Result of one decode step
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeStep {
    /// Nothing available yet; call again
    Pending,
    /// A non-empty windowed buffer
    Buffer(DecodedBuffer),
    /// The engine has produced all of its output
    EndOfStream,
}

/// Drives one decode engine over the audio track of one source
pub struct AudioDecoder {
    source: Box<dyn MediaSource>,
    codec: Box<dyn Codec>,
    track_index: usize,
    track: TrackInfo,
    units: PcmUnits,
    window: TimeWindow,
    state: DecoderState,
    all_input_extracted: bool,
}

impl AudioDecoder {
    /// Select the first audio track of `source` and configure `codec` for it
    ///
    /// The window starts out as the whole track.
    ///
    /// # Errors
    /// * `NoAudioTrack` - If no track has an `audio/` mime type
    /// * `MissingDuration` - If the track does not report its duration
    pub fn new(mut source: Box<dyn MediaSource>, mut codec: Box<dyn Codec>) -> Result<Self> {
        let track_index = find_audio_track(source.as_ref())?.ok_or(ClipError::NoAudioTrack)?;
        source.select_track(track_index)?;

        let format = source.track_format(track_index)?;
        let track = TrackInfo::from_format(&format)?;
        codec.configure(&format, CodecRole::Decoder)?;

        info!(
            "[DECODER] Track {} selected: {} ({:?} Hz, {:?} ch, {}us)",
            track_index, track.mime, track.sample_rate, track.channel_count, track.duration_us
        );

        Ok(AudioDecoder {
            units: track.pcm_units(),
            window: TimeWindow::full(track.duration_us),
            source,
            codec,
            track_index,
            track,
            state: DecoderState::Idle,
            all_input_extracted: false,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn track_info(&self) -> &TrackInfo {
        &self.track
    }

    pub fn track_index(&self) -> usize {
        self.track_index
    }

    pub fn units(&self) -> PcmUnits {
        self.units
    }

    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    pub fn duration_us(&self) -> i64 {
        self.track.duration_us
    }

    pub fn start_time_us(&self) -> i64 {
        self.window.start_us()
    }

    pub fn end_time_us(&self) -> i64 {
        self.window.end_us()
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Whether every source sample of the window has been pushed
    pub fn is_input_extracted(&self) -> bool {
        self.all_input_extracted
    }

    /// Whether the engine has no more output for this pass
    pub fn is_finished(&self) -> bool {
        matches!(self.state, DecoderState::Finished | DecoderState::Released)
    }

    /// Set the window start, clamped into `[0, duration]`
    pub fn set_start_time_us(&mut self, start_us: i64) {
        self.window.set_start_us(start_us);
    }

    /// Set the window end, clamped into `[0, duration]`
    pub fn set_end_time_us(&mut self, end_us: i64) {
        self.window.set_end_us(end_us);
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Seek to the window start and start the engine
    pub fn start(&mut self) -> Result<()> {
        self.start_or_restart(true)
    }

    /// Seek to the window start and flush the engine, keeping its configuration
    ///
    /// Restarting a decoder that was never started starts it.
    pub fn restart(&mut self) -> Result<()> {
        let start = self.state == DecoderState::Idle;
        self.start_or_restart(start)
    }

    fn start_or_restart(&mut self, start: bool) -> Result<()> {
        if self.state == DecoderState::Released {
            return Err(ClipError::PipelineStopped);
        }
        self.window.validate()?;

        self.source
            .seek_to(self.window.start_us(), SeekMode::PreviousSync)?;
        if start {
            self.codec.start()?;
        } else {
            self.codec.flush()?;
        }

        self.all_input_extracted = false;
        self.state = DecoderState::Started;
        info!(
            "[DECODER] {} window [{}us, {}us]",
            if start { "Started" } else { "Restarted" },
            self.window.start_us(),
            self.window.end_us()
        );
        Ok(())
    }

    /// Stop the engine. The decoder reports itself finished afterwards.
    pub fn stop(&mut self) -> Result<()> {
        match self.state {
            DecoderState::Idle | DecoderState::Released => Ok(()),
            _ => {
                self.state = DecoderState::Finished;
                self.codec.stop()
            }
        }
    }

    /// Stop and free the engine and the source. Safe to call repeatedly.
    pub fn release_resources(&mut self) {
        if self.state == DecoderState::Released {
            return;
        }
        if let Err(e) = self.stop() {
            warn!("[DECODER] Stop failed during release: {}", e);
        }
        self.codec.release();
        self.source.release();
        self.state = DecoderState::Released;
        debug!("[DECODER] Released");
    }

    // ========================================================================
    // Decoding
    // ========================================================================

    /// Make one non-blocking attempt to produce a windowed buffer
    ///
    /// Pushes at most one source sample per pulled output. Buffers that end
    /// up empty after windowing are released here and the next output is
    /// pulled straight away; "try again" from the engine returns `Pending`.
    pub fn step(&mut self) -> Result<DecodeStep> {
        loop {
            match self.state {
                DecoderState::Idle => {
                    return Err(ClipError::codec("decoder", "step called before start"))
                }
                DecoderState::Released => return Err(ClipError::PipelineStopped),
                DecoderState::Finished => return Ok(DecodeStep::EndOfStream),
                _ => {}
            }

            self.feed_input()?;

            match self.codec.dequeue_output_buffer() {
                OutputStatus::TryAgain => return Ok(DecodeStep::Pending),
                OutputStatus::BuffersChanged => {
                    debug!("[DECODER] Output buffers changed");
                    return Ok(DecodeStep::Pending);
                }
                OutputStatus::FormatChanged => {
                    debug!(
                        "[DECODER] Output format: {:?}",
                        self.codec.output_format()
                    );
                    return Ok(DecodeStep::Pending);
                }
                OutputStatus::Fault(code) => {
                    return Err(ClipError::codec(
                        "decoder",
                        format!("unexpected result from dequeue_output_buffer: {}", code),
                    ))
                }
                OutputStatus::Buffer { index, info } => {
                    let end_of_stream = info.flags.is_end_of_stream();
                    let buffer = self.window_buffer(index, info)?;
                    if end_of_stream {
                        self.state = DecoderState::Finished;
                        debug!("[DECODER] End of stream at {}us", info.presentation_time_us);
                    }

                    if !buffer.is_empty() {
                        return Ok(DecodeStep::Buffer(buffer));
                    }
                    self.codec.release_output_buffer(index)?;
                    if end_of_stream {
                        return Ok(DecodeStep::EndOfStream);
                    }
                }
            }
        }
    }

    /// Push the next source sample into the engine, or end its input
    fn feed_input(&mut self) -> Result<()> {
        if self.all_input_extracted {
            return Ok(());
        }
        let Some(index) = self.codec.dequeue_input_buffer() else {
            return Ok(());
        };

        let slot = self.codec.input_buffer(index)?;
        let read = self.source.read_sample(slot)?;

        match (read, self.source.sample_time()) {
            (Some(size), Some(time_us)) if time_us <= self.window.end_us() => {
                let flags = self.source.sample_flags();
                self.codec
                    .queue_input_buffer(index, BufferInfo::new(0, size, time_us, flags))?;
                self.source.advance();
                self.state = DecoderState::Producing;
            }
            _ => {
                self.codec
                    .queue_input_buffer(index, BufferInfo::end_of_stream())?;
                self.all_input_extracted = true;
                self.state = DecoderState::Draining;
                debug!("[DECODER] All input extracted");
            }
        }
        Ok(())
    }

    /// Cut a raw output buffer down to the time window
    fn window_buffer(&self, index: usize, info: BufferInfo) -> Result<DecodedBuffer> {
        let available = self.codec.output_buffer(index)?.len();
        let mut limit = (info.offset + info.size).min(available);
        let mut position = info.offset.min(limit);

        let pts = info.presentation_time_us;
        let start_us = self.window.start_us();
        let end_us = self.window.end_us();

        if pts < start_us {
            let skip = self.units.us_to_bytes(start_us - pts).max(0) as usize;
            position = (position + self.units.align_to_frame(skip)).min(limit);
        }

        let next_time_us = pts + self.units.bytes_to_us(info.size as i64);
        if next_time_us > end_us {
            let excess = self.units.us_to_bytes(next_time_us - end_us).max(0) as usize;
            limit = limit
                .saturating_sub(self.units.align_to_frame(excess))
                .max(position);
        }

        Ok(DecodedBuffer {
            index,
            position,
            limit,
            offset: info.offset,
            size: info.size,
            presentation_time_us: pts,
            flags: info.flags,
        })
    }

    /// The remaining windowed bytes of a produced buffer
    pub fn bytes(&self, buffer: &DecodedBuffer) -> Result<&[u8]> {
        let data = self.codec.output_buffer(buffer.index)?;
        data.get(buffer.position..buffer.limit).ok_or_else(|| {
            ClipError::codec("decoder", format!("buffer {} shrank while held", buffer.index))
        })
    }

    /// Hand a produced buffer back to the engine
    pub fn release(&mut self, buffer: DecodedBuffer) -> Result<()> {
        self.codec.release_output_buffer(buffer.index)
    }
}
