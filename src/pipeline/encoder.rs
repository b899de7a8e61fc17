//! Encode driver
//!
//! Owns the encode engine. Each `step` tries to fill one input slot with
//! faded PCM pulled from the decode driver, then drains at most one encoded
//! output into the mux synchronizer.

use std::fmt;

use log::{debug, info, warn};

use crate::config::EncoderTarget;
use crate::engine::codec::{Codec, CodecRole};
use crate::engine::format::{BufferFlags, BufferInfo, MediaFormat, OutputStatus, MIME_AUDIO_AAC};
use crate::error::{ClipError, Result};
use crate::pipeline::decoder::{AudioDecoder, DecodeStep, DecodedBuffer, TrackInfo};
use crate::pipeline::fade::FadeOut;
use crate::pipeline::mux::{EncodedFrame, MuxSynchronizer};
use crate::pipeline::units::PcmUnits;
use crate::pipeline::{DEFAULT_BIT_RATE, DEFAULT_CHANNEL_COUNT, DEFAULT_SAMPLE_RATE};

/// Input slot size requested from the encode engine
pub const MAX_INPUT_SIZE: usize = 256 * 1024;

/// Lifecycle of the encode driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncoderState {
    #[default]
    NotStarted,
    /// PCM was submitted on the last step
    Feeding,
    /// Waiting on input or pulling output
    Draining,
    /// End of stream has been queued
    InputDone,
    /// The engine emitted its end-of-stream frame
    Finished,
    /// Engine released
    Stopped,
}

impl fmt::Display for EncoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncoderState::NotStarted => write!(f, "NotStarted"),
            EncoderState::Feeding => write!(f, "Feeding"),
            EncoderState::Draining => write!(f, "Draining"),
            EncoderState::InputDone => write!(f, "InputDone"),
            EncoderState::Finished => write!(f, "Finished"),
            EncoderState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// What one encode step did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeStep {
    /// Some input was submitted or some output handled
    pub progressed: bool,
    /// The decoding pass ran dry on this step
    pub input_exhausted: bool,
    /// The end-of-stream frame has been written
    pub finished: bool,
}

/// Encoder output format: target overrides, then track values, then defaults
pub fn output_format(track: &TrackInfo, target: &EncoderTarget) -> MediaFormat {
    let mime = target.mime.clone().unwrap_or_else(|| MIME_AUDIO_AAC.to_string());
    let sample_rate = target
        .sample_rate
        .or(track.sample_rate)
        .unwrap_or(DEFAULT_SAMPLE_RATE);
    let channel_count = target
        .channel_count
        .or(track.channel_count)
        .unwrap_or(DEFAULT_CHANNEL_COUNT);
    let bit_rate = target
        .bit_rate
        .or(track.bit_rate)
        .unwrap_or(DEFAULT_BIT_RATE);

    MediaFormat::audio(mime, sample_rate, channel_count)
        .with_bit_rate(bit_rate)
        .with_max_input_size(MAX_INPUT_SIZE)
}

/// Drives one encode engine session
pub struct AudioEncoder {
    codec: Box<dyn Codec>,
    format: MediaFormat,
    units: PcmUnits,
    state: EncoderState,
    input_done: bool,
    samples_submitted: i64,
    /// Input slot dequeued but not yet filled
    held_slot: Option<usize>,
    /// Decoded buffer only partly copied into the engine
    pending: Option<DecodedBuffer>,
    exhaustion_reported: bool,
}

impl AudioEncoder {
    /// Configure and start `codec` for the given track
    ///
    /// # Errors
    /// `UnsupportedFormat` if the target asks for a sample rate or channel
    /// count other than the decoded PCM's. Samples are passed through
    /// unconverted, so the layouts must agree.
    pub fn start(mut codec: Box<dyn Codec>, track: &TrackInfo, target: &EncoderTarget) -> Result<Self> {
        let format = output_format(track, target);
        let decoded = track.pcm_units();
        if format.sample_rate != Some(decoded.sample_rate)
            || format.channel_count != Some(decoded.channel_count)
        {
            return Err(ClipError::UnsupportedFormat {
                format: format!(
                    "{} Hz {} ch output from {} Hz {} ch PCM (no resampling or remixing)",
                    format.sample_rate.unwrap_or_default(),
                    format.channel_count.unwrap_or_default(),
                    decoded.sample_rate,
                    decoded.channel_count
                ),
            });
        }
        codec.configure(&format, CodecRole::Encoder)?;
        codec.start()?;

        let units = PcmUnits::new(
            format.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE),
            format.channel_count.unwrap_or(DEFAULT_CHANNEL_COUNT),
        );
        info!(
            "[ENCODER] Started {}: {} Hz, {} ch, {:?} bps",
            format.mime, units.sample_rate, units.channel_count, format.bit_rate
        );

        Ok(AudioEncoder {
            codec,
            format,
            units,
            state: EncoderState::NotStarted,
            input_done: false,
            samples_submitted: 0,
            held_slot: None,
            pending: None,
            exhaustion_reported: false,
        })
    }

    pub fn format(&self) -> &MediaFormat {
        &self.format
    }

    pub fn units(&self) -> PcmUnits {
        self.units
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    /// Whether end of stream has been queued to the engine
    pub fn is_input_done(&self) -> bool {
        self.input_done
    }

    pub fn is_finished(&self) -> bool {
        self.state == EncoderState::Finished
    }

    /// Presentation time the next input buffer will carry
    pub fn presentation_time_us(&self) -> i64 {
        self.units.samples_to_us(self.samples_submitted)
    }

    /// Samples handed to the engine so far, over all passes
    pub fn samples_submitted(&self) -> i64 {
        self.samples_submitted
    }

    /// Run one non-blocking step
    pub fn step(
        &mut self,
        decoder: &mut AudioDecoder,
        fade: &mut FadeOut,
        mux: &mut MuxSynchronizer,
    ) -> Result<EncodeStep> {
        match self.state {
            EncoderState::Finished => {
                return Ok(EncodeStep {
                    finished: true,
                    ..EncodeStep::default()
                })
            }
            EncoderState::Stopped => return Err(ClipError::PipelineStopped),
            _ => {}
        }

        let mut outcome = EncodeStep::default();
        if !self.input_done {
            self.feed_input(decoder, fade, &mut outcome)?;
        }
        self.drain_output(mux, &mut outcome)?;

        if !outcome.progressed && self.state == EncoderState::Feeding {
            self.state = EncoderState::Draining;
        }
        outcome.finished = self.is_finished();
        Ok(outcome)
    }

    fn feed_input(
        &mut self,
        decoder: &mut AudioDecoder,
        fade: &mut FadeOut,
        outcome: &mut EncodeStep,
    ) -> Result<()> {
        let Some(slot) = self.held_slot.take().or_else(|| self.codec.dequeue_input_buffer()) else {
            return Ok(());
        };

        let mut buffer = match self.pending.take() {
            Some(buffer) => buffer,
            None if decoder.is_finished() && self.exhaustion_reported => {
                return self.queue_end_of_stream(slot);
            }
            None if decoder.is_finished() => {
                self.held_slot = Some(slot);
                self.report_exhaustion(outcome);
                return Ok(());
            }
            None => match decoder.step()? {
                DecodeStep::Buffer(buffer) => buffer,
                DecodeStep::Pending => {
                    self.held_slot = Some(slot);
                    return Ok(());
                }
                DecodeStep::EndOfStream => {
                    self.held_slot = Some(slot);
                    self.report_exhaustion(outcome);
                    return Ok(());
                }
            },
        };

        let window = *decoder.window();
        let decoder_units = decoder.units();
        let copied = {
            let src = decoder.bytes(&buffer)?;
            let dst = self.codec.input_buffer(slot)?;
            let len = src.len().min(dst.len()) & !1;
            if len == 0 {
                return Err(ClipError::codec(
                    "encoder",
                    format!("input slot {} cannot hold a single sample", slot),
                ));
            }
            fade.process(&window, &decoder_units, &src[..len], &mut dst[..len]);
            len
        };

        let pts = self.presentation_time_us();
        self.codec.queue_input_buffer(
            slot,
            BufferInfo::new(0, copied, pts, BufferFlags::SYNC_FRAME),
        )?;
        self.samples_submitted += (copied / 2) as i64;
        self.state = EncoderState::Feeding;
        outcome.progressed = true;

        buffer.consume(copied);
        if buffer.is_empty() {
            decoder.release(buffer)?;
            if decoder.is_finished() {
                self.report_exhaustion(outcome);
            }
        } else {
            debug!(
                "[ENCODER] Decoded buffer split: {} bytes left",
                buffer.len()
            );
            self.pending = Some(buffer);
        }
        Ok(())
    }

    fn queue_end_of_stream(&mut self, slot: usize) -> Result<()> {
        let info = BufferInfo::new(
            0,
            0,
            self.presentation_time_us(),
            BufferFlags::END_OF_STREAM,
        );
        self.codec.queue_input_buffer(slot, info)?;
        self.input_done = true;
        self.state = EncoderState::InputDone;
        info!(
            "[ENCODER] End of input queued at {}us",
            info.presentation_time_us
        );
        Ok(())
    }

    fn report_exhaustion(&mut self, outcome: &mut EncodeStep) {
        if !self.exhaustion_reported {
            self.exhaustion_reported = true;
            outcome.input_exhausted = true;
            debug!("[ENCODER] Decoding pass exhausted");
        }
    }

    fn drain_output(&mut self, mux: &mut MuxSynchronizer, outcome: &mut EncodeStep) -> Result<()> {
        match self.codec.dequeue_output_buffer() {
            OutputStatus::TryAgain => {}
            OutputStatus::BuffersChanged => debug!("[ENCODER] Output buffers changed"),
            OutputStatus::FormatChanged => {
                let format = self.codec.output_format().ok_or_else(|| {
                    ClipError::codec("encoder", "format changed without an output format")
                })?;
                mux.add_track(&format)?;
                outcome.progressed = true;
            }
            OutputStatus::Fault(code) => {
                return Err(ClipError::codec(
                    "encoder",
                    format!("unexpected result from dequeue_output_buffer: {}", code),
                ))
            }
            OutputStatus::Buffer { index, info } => {
                let is_config = info.flags.contains(BufferFlags::CODEC_CONFIG);
                if info.size > 0 && !is_config {
                    let data = self.codec.output_buffer(index)?;
                    let end = (info.offset + info.size).min(data.len());
                    let start = info.offset.min(end);
                    // the slice is the whole payload now
                    mux.write(EncodedFrame {
                        data: &data[start..end],
                        info: BufferInfo {
                            offset: 0,
                            size: end - start,
                            ..info
                        },
                    })?;
                }
                self.codec.release_output_buffer(index)?;
                outcome.progressed = true;

                if info.flags.is_end_of_stream() {
                    self.state = EncoderState::Finished;
                    info!(
                        "[ENCODER] Finished after {} frames",
                        mux.frames_written()
                    );
                }
            }
        }
        Ok(())
    }

    /// Give back any partly consumed decoded buffer before the decoder restarts
    pub fn discard_pending(&mut self, decoder: &mut AudioDecoder) -> Result<()> {
        if let Some(buffer) = self.pending.take() {
            decoder.release(buffer)?;
        }
        self.exhaustion_reported = false;
        Ok(())
    }

    /// Stop and free the engine. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if self.state == EncoderState::Stopped {
            return;
        }
        self.pending = None;
        self.held_slot = None;
        if let Err(e) = self.codec.stop() {
            warn!("[ENCODER] Stop failed: {}", e);
        }
        self.codec.release();
        self.state = EncoderState::Stopped;
        debug!("[ENCODER] Released");
    }
}
