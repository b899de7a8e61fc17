//! Shared test fakes
//!
//! A scripted PCM source, a codec wrapper that counts buffer hand-offs and
//! injects faults, and a container writer that records everything.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use audioclip::config::{EncoderTarget, PipelineConfig};
use audioclip::engine::{
    shared, BufferFlags, BufferInfo, Codec, CodecRole, ContainerWriter, MediaFormat, MediaSource,
    OutputStatus, PcmCodec, SeekMode, MIME_AUDIO_RAW,
};
use audioclip::pipeline::AudioPipeline;
use audioclip::{ClipError, Result};

// === Source ===

#[derive(Debug, Clone, Copy)]
pub enum Signal {
    /// Each sample holds its own interleaved index (mod 30000)
    Ramp,
    Constant(i16),
}

/// In-memory 16-bit PCM track cut into fixed access units
pub struct ScriptedSource {
    tracks: Vec<MediaFormat>,
    audio_track: Option<usize>,
    sample_rate: u32,
    channels: u16,
    unit_frames: usize,
    total_frames: usize,
    signal: Signal,
    position: usize,
    selected: bool,
    pub seeks: Arc<Mutex<Vec<i64>>>,
}

impl ScriptedSource {
    pub fn new(sample_rate: u32, channels: u16, duration_us: i64) -> Self {
        let total_frames = (duration_us as i128 * sample_rate as i128 / 1_000_000) as usize;
        let mut source = ScriptedSource {
            tracks: Vec::new(),
            audio_track: Some(0),
            sample_rate,
            channels,
            unit_frames: 1024,
            total_frames,
            signal: Signal::Ramp,
            position: 0,
            selected: false,
            seeks: Arc::new(Mutex::new(Vec::new())),
        };
        source.tracks = vec![source.audio_format(Some(duration_us))];
        source
    }

    fn audio_format(&self, duration_us: Option<i64>) -> MediaFormat {
        let mut format = MediaFormat::audio(MIME_AUDIO_RAW, self.sample_rate, self.channels)
            .with_max_input_size(self.unit_frames * self.channels as usize * 2);
        format.duration_us = duration_us;
        format
    }

    pub fn with_unit_frames(mut self, unit_frames: usize) -> Self {
        self.unit_frames = unit_frames;
        if let Some(index) = self.audio_track {
            let duration = self.tracks[index].duration_us;
            self.tracks[index] = self.audio_format(duration);
        }
        self
    }

    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = signal;
        self
    }

    /// Put a video track in front of the audio track
    pub fn with_video_track(mut self) -> Self {
        self.tracks.insert(0, MediaFormat::new("video/avc"));
        self.audio_track = self.audio_track.map(|i| i + 1);
        self
    }

    pub fn without_audio(mut self) -> Self {
        self.tracks = vec![MediaFormat::new("video/avc")];
        self.audio_track = None;
        self
    }

    pub fn without_duration(mut self) -> Self {
        if let Some(index) = self.audio_track {
            self.tracks[index].duration_us = None;
        }
        self
    }

    pub fn sample_at(&self, frame: usize, channel: usize) -> i16 {
        match self.signal {
            Signal::Ramp => ((frame * self.channels as usize + channel) % 30_000) as i16,
            Signal::Constant(value) => value,
        }
    }

    fn frames_to_us(&self, frames: usize) -> i64 {
        (frames as i128 * 1_000_000 / self.sample_rate as i128) as i64
    }
}

impl MediaSource for ScriptedSource {
    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_format(&self, index: usize) -> Result<MediaFormat> {
        self.tracks
            .get(index)
            .cloned()
            .ok_or(ClipError::InvalidTrack { index })
    }

    fn select_track(&mut self, index: usize) -> Result<()> {
        if Some(index) != self.audio_track {
            return Err(ClipError::InvalidTrack { index });
        }
        self.selected = true;
        Ok(())
    }

    fn seek_to(&mut self, time_us: i64, _mode: SeekMode) -> Result<()> {
        self.seeks.lock().unwrap().push(time_us);
        let frame = (time_us as i128 * self.sample_rate as i128 / 1_000_000) as usize;
        self.position = (frame / self.unit_frames * self.unit_frames).min(self.total_frames);
        Ok(())
    }

    fn read_sample(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        if !self.selected || self.position >= self.total_frames {
            return Ok(None);
        }
        let frames = self.unit_frames.min(self.total_frames - self.position);
        let channels = self.channels as usize;
        for f in 0..frames {
            for c in 0..channels {
                let at = (f * channels + c) * 2;
                let value = self.sample_at(self.position + f, c);
                buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
            }
        }
        Ok(Some(frames * channels * 2))
    }

    fn sample_time(&self) -> Option<i64> {
        (self.selected && self.position < self.total_frames)
            .then(|| self.frames_to_us(self.position))
    }

    fn sample_flags(&self) -> BufferFlags {
        BufferFlags::SYNC_FRAME
    }

    fn advance(&mut self) -> bool {
        self.position = (self.position + self.unit_frames).min(self.total_frames);
        self.position < self.total_frames
    }

    fn release(&mut self) {
        self.selected = false;
    }
}

// === Codec ===

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecStats {
    pub outputs_dequeued: usize,
    pub outputs_released: usize,
    pub double_releases: usize,
    pub flushes: usize,
    pub released: bool,
}

impl CodecStats {
    pub fn outstanding(&self) -> usize {
        self.outputs_dequeued - self.outputs_released
    }
}

/// Output slot reported for the injected codec-config frame
const CONFIG_FRAME_INDEX: usize = usize::MAX;
pub const CONFIG_FRAME: [u8; 8] = [0xAA; 8];
pub const PADDING_BYTE: u8 = 0x7F;

/// `PcmCodec` wrapper that counts output hand-offs and can misbehave on cue
pub struct TrackingCodec {
    inner: PcmCodec,
    stats: Arc<Mutex<CodecStats>>,
    collapse_final_pts: bool,
    fault_on_poll: Option<usize>,
    polls: usize,
    output_padding: usize,
    padded: HashMap<usize, Vec<u8>>,
    config_frame_pending: bool,
}

impl TrackingCodec {
    pub fn new(inner: PcmCodec) -> (Self, Arc<Mutex<CodecStats>>) {
        let stats = Arc::new(Mutex::new(CodecStats::default()));
        (
            TrackingCodec {
                inner,
                stats: stats.clone(),
                collapse_final_pts: false,
                fault_on_poll: None,
                polls: 0,
                output_padding: 0,
                padded: HashMap::new(),
                config_frame_pending: false,
            },
            stats,
        )
    }

    /// Stamp the end-of-stream frame with time 0
    pub fn with_collapsed_final_pts(mut self) -> Self {
        self.collapse_final_pts = true;
        self
    }

    /// Report an engine fault on the `n`th output poll (1-based)
    pub fn with_fault_on_poll(mut self, n: usize) -> Self {
        self.fault_on_poll = Some(n);
        self
    }

    /// Place `n` filler bytes ahead of every output payload and report
    /// them through `BufferInfo::offset`
    pub fn with_output_offset(mut self, n: usize) -> Self {
        self.output_padding = n;
        self
    }

    /// Emit one `CODEC_CONFIG` frame before any real output
    pub fn with_config_frame(mut self) -> Self {
        self.config_frame_pending = true;
        self
    }
}

impl Codec for TrackingCodec {
    fn configure(&mut self, format: &MediaFormat, role: CodecRole) -> Result<()> {
        self.inner.configure(format, role)
    }

    fn start(&mut self) -> Result<()> {
        self.inner.start()
    }

    fn flush(&mut self) -> Result<()> {
        self.stats.lock().unwrap().flushes += 1;
        self.inner.flush()
    }

    fn stop(&mut self) -> Result<()> {
        self.inner.stop()
    }

    fn release(&mut self) {
        self.stats.lock().unwrap().released = true;
        self.inner.release()
    }

    fn dequeue_input_buffer(&mut self) -> Option<usize> {
        self.inner.dequeue_input_buffer()
    }

    fn input_buffer(&mut self, index: usize) -> Result<&mut [u8]> {
        self.inner.input_buffer(index)
    }

    fn queue_input_buffer(&mut self, index: usize, info: BufferInfo) -> Result<()> {
        self.inner.queue_input_buffer(index, info)
    }

    fn dequeue_output_buffer(&mut self) -> OutputStatus {
        self.polls += 1;
        if self.fault_on_poll == Some(self.polls) {
            return OutputStatus::Fault(-1000);
        }
        if self.config_frame_pending {
            self.config_frame_pending = false;
            self.stats.lock().unwrap().outputs_dequeued += 1;
            return OutputStatus::Buffer {
                index: CONFIG_FRAME_INDEX,
                info: BufferInfo::new(0, CONFIG_FRAME.len(), 0, BufferFlags::CODEC_CONFIG),
            };
        }
        match self.inner.dequeue_output_buffer() {
            OutputStatus::Buffer { index, mut info } => {
                self.stats.lock().unwrap().outputs_dequeued += 1;
                if self.collapse_final_pts && info.flags.is_end_of_stream() && info.size > 0 {
                    info.presentation_time_us = 0;
                }
                if self.output_padding > 0 && info.size > 0 {
                    let data = self.inner.output_buffer(index).unwrap();
                    let mut padded = vec![PADDING_BYTE; self.output_padding];
                    padded.extend_from_slice(&data[info.offset..info.offset + info.size]);
                    self.padded.insert(index, padded);
                    info.offset = self.output_padding;
                }
                OutputStatus::Buffer { index, info }
            }
            other => other,
        }
    }

    fn output_buffer(&self, index: usize) -> Result<&[u8]> {
        if index == CONFIG_FRAME_INDEX {
            return Ok(&CONFIG_FRAME);
        }
        match self.padded.get(&index) {
            Some(data) => Ok(data),
            None => self.inner.output_buffer(index),
        }
    }

    fn release_output_buffer(&mut self, index: usize) -> Result<()> {
        if index == CONFIG_FRAME_INDEX {
            self.stats.lock().unwrap().outputs_released += 1;
            return Ok(());
        }
        self.padded.remove(&index);
        let result = self.inner.release_output_buffer(index);
        let mut stats = self.stats.lock().unwrap();
        match result {
            Ok(()) => stats.outputs_released += 1,
            Err(_) => stats.double_releases += 1,
        }
        result
    }

    fn output_format(&self) -> Option<MediaFormat> {
        self.inner.output_format()
    }
}

// === Writer ===

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenSample {
    pub track: usize,
    pub presentation_time_us: i64,
    pub data: Vec<u8>,
    pub flags: BufferFlags,
}

#[derive(Debug, Default)]
pub struct Recording {
    pub tracks: Vec<MediaFormat>,
    pub samples: Vec<WrittenSample>,
    pub started: bool,
    pub released: bool,
}

impl Recording {
    pub fn timestamps(&self) -> Vec<i64> {
        self.samples.iter().map(|s| s.presentation_time_us).collect()
    }

    /// Every written payload decoded as LE 16-bit PCM
    pub fn pcm(&self) -> Vec<i16> {
        self.samples
            .iter()
            .flat_map(|s| s.data.chunks_exact(2))
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }
}

pub struct RecordingWriter {
    recording: Arc<Mutex<Recording>>,
}

impl RecordingWriter {
    pub fn new() -> (Self, Arc<Mutex<Recording>>) {
        let recording = Arc::new(Mutex::new(Recording::default()));
        (
            RecordingWriter {
                recording: recording.clone(),
            },
            recording,
        )
    }
}

impl ContainerWriter for RecordingWriter {
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize> {
        let mut recording = self.recording.lock().unwrap();
        recording.tracks.push(format.clone());
        Ok(recording.tracks.len() - 1)
    }

    fn start(&mut self) -> Result<()> {
        self.recording.lock().unwrap().started = true;
        Ok(())
    }

    fn write_sample(&mut self, track_index: usize, data: &[u8], info: &BufferInfo) -> Result<()> {
        let end = (info.offset + info.size).min(data.len());
        self.recording.lock().unwrap().samples.push(WrittenSample {
            track: track_index,
            presentation_time_us: info.presentation_time_us,
            data: data[info.offset.min(end)..end].to_vec(),
            flags: info.flags,
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn release(&mut self) {
        self.recording.lock().unwrap().released = true;
    }
}

// === Harness ===

/// Config whose encoder emits raw PCM, so output bytes can be inspected
pub fn raw_config() -> PipelineConfig {
    PipelineConfig::default().with_target(EncoderTarget {
        mime: Some(MIME_AUDIO_RAW.to_string()),
        ..Default::default()
    })
}

pub struct Harness {
    pub pipeline: AudioPipeline,
    pub recording: Arc<Mutex<Recording>>,
    pub decoder_stats: Arc<Mutex<CodecStats>>,
    pub encoder_stats: Arc<Mutex<CodecStats>>,
}

pub fn build(source: ScriptedSource, config: &PipelineConfig) -> Result<Harness> {
    build_with(source, TrackingCodec::new(PcmCodec::new()), config)
}

/// Build a pipeline around a custom encoder wrapper
pub fn build_with(
    source: ScriptedSource,
    encoder: (TrackingCodec, Arc<Mutex<CodecStats>>),
    config: &PipelineConfig,
) -> Result<Harness> {
    build_with_codecs(source, TrackingCodec::new(PcmCodec::new()), encoder, config)
}

/// Build a pipeline around custom decoder and encoder wrappers
pub fn build_with_codecs(
    source: ScriptedSource,
    decoder: (TrackingCodec, Arc<Mutex<CodecStats>>),
    encoder: (TrackingCodec, Arc<Mutex<CodecStats>>),
    config: &PipelineConfig,
) -> Result<Harness> {
    let (decoder, decoder_stats) = decoder;
    let (encoder, encoder_stats) = encoder;
    let (writer, recording) = RecordingWriter::new();

    let pipeline = AudioPipeline::new(
        Box::new(source),
        Box::new(decoder),
        Box::new(encoder),
        shared(writer),
        config,
    )?;
    Ok(Harness {
        pipeline,
        recording,
        decoder_stats,
        encoder_stats,
    })
}
