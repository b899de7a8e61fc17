//! PCM codec engine
//!
//! A software engine for `audio/raw` streams. As a decoder it passes each
//! queued access unit through unchanged. As an encoder it re-frames the
//! incoming PCM into fixed frames of `frame_size` multi-channel frames, the
//! way block-based audio encoders do, and stamps each frame with its own
//! presentation time.
//!
//! Slot bookkeeping is strict: queueing or releasing a buffer the client
//! does not hold is an error, so a double release surfaces immediately.

use std::collections::VecDeque;

use log::debug;

use crate::engine::codec::{Codec, CodecRole};
use crate::engine::format::{BufferFlags, BufferInfo, MediaFormat, OutputStatus, MIME_AUDIO_RAW};
use crate::error::{ClipError, Result};
use crate::pipeline::units::PcmUnits;

/// Input slot capacity when the format does not request one
pub const DEFAULT_MAX_INPUT_SIZE: usize = 64 * 1024;

/// Multi-channel frames per encoded output frame
pub const DEFAULT_FRAME_SIZE: usize = 1024;

const DEFAULT_INPUT_SLOTS: usize = 4;
const DEFAULT_OUTPUT_SLOTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Uninitialized,
    Configured,
    Running,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputSlot {
    Free,
    Dequeued,
}

#[derive(Debug)]
struct OutputSlot {
    data: Vec<u8>,
    info: BufferInfo,
}

/// Passthrough decoder / framing encoder for 16-bit PCM
#[derive(Debug)]
pub struct PcmCodec {
    lifecycle: Lifecycle,
    role: CodecRole,
    format: Option<MediaFormat>,
    units: PcmUnits,
    frame_size: usize,

    input_data: Vec<Vec<u8>>,
    input_slots: Vec<InputSlot>,
    output_slots: Vec<Option<OutputSlot>>,
    /// Produced output not yet handed to the client
    pending: VecDeque<OutputSlot>,

    format_announced: bool,
    input_ended: bool,

    // Encoder framing
    assembler: Vec<u8>,
    next_frame_pts: Option<i64>,
}

impl Default for PcmCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl PcmCodec {
    /// Create an unconfigured engine with default slot counts
    pub fn new() -> Self {
        Self::with_slots(DEFAULT_INPUT_SLOTS, DEFAULT_OUTPUT_SLOTS)
    }

    /// Create an unconfigured engine with the given number of slots
    pub fn with_slots(input_slots: usize, output_slots: usize) -> Self {
        PcmCodec {
            lifecycle: Lifecycle::Uninitialized,
            role: CodecRole::Decoder,
            format: None,
            units: PcmUnits::new(0, 0),
            frame_size: DEFAULT_FRAME_SIZE,
            input_data: vec![Vec::new(); input_slots.max(1)],
            input_slots: vec![InputSlot::Free; input_slots.max(1)],
            output_slots: (0..output_slots.max(1)).map(|_| None).collect(),
            pending: VecDeque::new(),
            format_announced: false,
            input_ended: false,
            assembler: Vec::new(),
            next_frame_pts: None,
        }
    }

    /// Create an engine for `mime`, failing for anything but raw PCM
    pub fn create_by_type(mime: &str) -> Result<Self> {
        if mime != MIME_AUDIO_RAW {
            return Err(ClipError::UnsupportedFormat {
                format: format!("{} (only {} codecs are available)", mime, MIME_AUDIO_RAW),
            });
        }
        Ok(Self::new())
    }

    /// Set the encoder frame size in multi-channel frames
    pub fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = frame_size.max(1);
        self
    }

    /// Number of output buffers the client currently holds
    pub fn outstanding_outputs(&self) -> usize {
        self.output_slots.iter().filter(|slot| slot.is_some()).count()
    }

    fn engine(&self) -> &'static str {
        self.role.label()
    }

    fn frame_bytes(&self) -> usize {
        self.frame_size * self.units.frame_bytes()
    }

    fn require_running(&self) -> Result<()> {
        if self.lifecycle != Lifecycle::Running {
            return Err(ClipError::codec(
                self.engine(),
                format!("operation requires a running engine (state {:?})", self.lifecycle),
            ));
        }
        Ok(())
    }

    fn reset_stream(&mut self) {
        for slot in self.input_slots.iter_mut() {
            *slot = InputSlot::Free;
        }
        for slot in self.output_slots.iter_mut() {
            *slot = None;
        }
        self.pending.clear();
        self.input_ended = false;
        self.assembler.clear();
        self.next_frame_pts = None;
    }

    fn accept_input(&mut self, data: Vec<u8>, info: BufferInfo) {
        match self.role {
            CodecRole::Decoder => {
                let size = data.len();
                self.pending.push_back(OutputSlot {
                    data,
                    info: BufferInfo::new(0, size, info.presentation_time_us, info.flags),
                });
            }
            CodecRole::Encoder => self.encode(data, info),
        }
    }

    fn encode(&mut self, data: Vec<u8>, info: BufferInfo) {
        if !data.is_empty() && self.next_frame_pts.is_none() {
            self.next_frame_pts = Some(info.presentation_time_us);
        }
        self.assembler.extend_from_slice(&data);

        let frame_bytes = self.frame_bytes();
        while frame_bytes > 0 && self.assembler.len() >= frame_bytes {
            let frame: Vec<u8> = self.assembler.drain(..frame_bytes).collect();
            self.emit_frame(frame, BufferFlags::SYNC_FRAME);
        }

        if info.flags.is_end_of_stream() {
            let rest = std::mem::take(&mut self.assembler);
            self.emit_frame(rest, BufferFlags::SYNC_FRAME | BufferFlags::END_OF_STREAM);
        }
    }

    fn emit_frame(&mut self, data: Vec<u8>, flags: BufferFlags) {
        let pts = self.next_frame_pts.unwrap_or(0);
        let frames = data.len() / self.units.frame_bytes().max(1);
        if !data.is_empty() {
            let samples = frames as i64 * self.units.channel_count as i64;
            self.next_frame_pts = Some(pts + self.units.samples_to_us(samples));
        }
        let size = data.len();
        self.pending.push_back(OutputSlot {
            data,
            info: BufferInfo::new(0, size, pts, flags),
        });
    }
}

impl Codec for PcmCodec {
    fn configure(&mut self, format: &MediaFormat, role: CodecRole) -> Result<()> {
        if self.lifecycle != Lifecycle::Uninitialized {
            return Err(ClipError::codec(role.label(), "configure called twice"));
        }
        if format.mime != MIME_AUDIO_RAW {
            return Err(ClipError::UnsupportedFormat {
                format: format.mime.clone(),
            });
        }
        let (sample_rate, channel_count) = match (format.sample_rate, format.channel_count) {
            (Some(rate), Some(channels)) if rate > 0 && channels > 0 => (rate, channels),
            _ => {
                return Err(ClipError::UnsupportedFormat {
                    format: format!("{} without sample rate and channel count", format.mime),
                })
            }
        };

        let capacity = format.max_input_size.unwrap_or(DEFAULT_MAX_INPUT_SIZE);
        for data in self.input_data.iter_mut() {
            *data = vec![0; capacity];
        }

        self.role = role;
        self.units = PcmUnits::new(sample_rate, channel_count);
        self.format = Some(format.clone());
        self.lifecycle = Lifecycle::Configured;
        debug!(
            "[PCM] {} configured: {} Hz, {} ch, {} byte input slots",
            role.label(),
            sample_rate,
            channel_count,
            capacity
        );
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Configured => {
                self.lifecycle = Lifecycle::Running;
                Ok(())
            }
            other => Err(ClipError::codec(
                self.engine(),
                format!("start called in state {:?}", other),
            )),
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.require_running()?;
        self.reset_stream();
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.lifecycle == Lifecycle::Running {
            self.reset_stream();
            self.lifecycle = Lifecycle::Configured;
        }
        Ok(())
    }

    fn release(&mut self) {
        self.reset_stream();
        self.input_data.clear();
        self.lifecycle = Lifecycle::Released;
    }

    fn dequeue_input_buffer(&mut self) -> Option<usize> {
        if self.lifecycle != Lifecycle::Running || self.input_ended {
            return None;
        }
        let index = self
            .input_slots
            .iter()
            .position(|slot| *slot == InputSlot::Free)?;
        self.input_slots[index] = InputSlot::Dequeued;
        Some(index)
    }

    fn input_buffer(&mut self, index: usize) -> Result<&mut [u8]> {
        match self.input_slots.get(index) {
            Some(InputSlot::Dequeued) => Ok(self.input_data[index].as_mut_slice()),
            _ => Err(ClipError::InvalidBufferIndex {
                engine: self.engine(),
                index,
            }),
        }
    }

    fn queue_input_buffer(&mut self, index: usize, info: BufferInfo) -> Result<()> {
        self.require_running()?;
        if self.input_slots.get(index) != Some(&InputSlot::Dequeued) {
            return Err(ClipError::InvalidBufferIndex {
                engine: self.engine(),
                index,
            });
        }
        let end = info.offset + info.size;
        if end > self.input_data[index].len() {
            return Err(ClipError::codec(
                self.engine(),
                format!(
                    "queued {} bytes into a {} byte slot",
                    end,
                    self.input_data[index].len()
                ),
            ));
        }

        let data = self.input_data[index][info.offset..end].to_vec();
        self.input_slots[index] = InputSlot::Free;
        if info.flags.is_end_of_stream() {
            self.input_ended = true;
        }
        self.accept_input(data, info);
        Ok(())
    }

    fn dequeue_output_buffer(&mut self) -> OutputStatus {
        if self.lifecycle != Lifecycle::Running {
            return OutputStatus::TryAgain;
        }
        if !self.format_announced {
            self.format_announced = true;
            return OutputStatus::FormatChanged;
        }
        let Some(index) = self.output_slots.iter().position(|slot| slot.is_none()) else {
            return OutputStatus::TryAgain;
        };
        match self.pending.pop_front() {
            Some(slot) => {
                let info = slot.info;
                self.output_slots[index] = Some(slot);
                OutputStatus::Buffer { index, info }
            }
            None => OutputStatus::TryAgain,
        }
    }

    fn output_buffer(&self, index: usize) -> Result<&[u8]> {
        match self.output_slots.get(index) {
            Some(Some(slot)) => Ok(slot.data.as_slice()),
            _ => Err(ClipError::InvalidBufferIndex {
                engine: self.engine(),
                index,
            }),
        }
    }

    fn release_output_buffer(&mut self, index: usize) -> Result<()> {
        match self.output_slots.get_mut(index) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                Ok(())
            }
            _ => Err(ClipError::InvalidBufferIndex {
                engine: self.engine(),
                index,
            }),
        }
    }

    fn output_format(&self) -> Option<MediaFormat> {
        if !self.format_announced {
            return None;
        }
        let format = self.format.as_ref()?;
        let mut output = MediaFormat::audio(
            MIME_AUDIO_RAW,
            self.units.sample_rate,
            self.units.channel_count,
        );
        output.bit_rate = format.bit_rate;
        Some(output)
    }
}
