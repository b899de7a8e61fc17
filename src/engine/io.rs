//! WAV file I/O for audioclip
//!
//! A `MediaSource` over a 16-bit PCM WAV file and a single-track
//! `ContainerWriter` that writes raw PCM frames back to WAV. Both sit on
//! top of `hound`.
//!
//! The source exposes the file as one `audio/raw` track cut into access
//! units of `chunk_frames` frames; every access unit is a sync sample.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, warn};

use crate::engine::container::ContainerWriter;
use crate::engine::format::{BufferFlags, BufferInfo, MediaFormat, SeekMode, MIME_AUDIO_RAW};
use crate::engine::source::MediaSource;
use crate::error::{ClipError, Result};
use crate::pipeline::units::PcmUnits;

/// Frames per access unit handed out by `WavSource`
pub const DEFAULT_CHUNK_FRAMES: u32 = 1024;

const BITS_PER_SAMPLE: u16 = 16;

// ============================================================================
// Source
// ============================================================================

/// 16-bit PCM WAV file exposed as a single-track media source
pub struct WavSource {
    path: PathBuf,
    reader: Option<WavReader<BufReader<File>>>,
    spec: WavSpec,
    total_frames: u32,
    chunk_frames: u32,
    /// Frame index of the current access unit
    position: u32,
    /// Frame index the reader will read next
    reader_position: u32,
    /// Current access unit, loaded on first read
    current: Option<Vec<u8>>,
    selected: bool,
}

impl WavSource {
    /// Open a WAV file
    ///
    /// # Errors
    /// * `FileNotFound` - If the file does not exist
    /// * `Wav` - If the file is not a valid WAV file
    /// * `UnsupportedFormat` - If the samples are not 16-bit integers
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_chunk(path, DEFAULT_CHUNK_FRAMES)
    }

    /// Open a WAV file with a custom access unit size
    pub fn open_with_chunk(path: &Path, chunk_frames: u32) -> Result<Self> {
        if !path.exists() {
            return Err(ClipError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let reader = WavReader::open(path)?;
        let spec = reader.spec();
        if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != BITS_PER_SAMPLE {
            return Err(ClipError::UnsupportedFormat {
                format: format!(
                    "{}-bit {:?} WAV (only 16-bit integer PCM supported)",
                    spec.bits_per_sample, spec.sample_format
                ),
            });
        }

        let total_frames = reader.duration();
        debug!(
            "[WAV] Opened {}: {} Hz, {} ch, {} frames",
            path.display(),
            spec.sample_rate,
            spec.channels,
            total_frames
        );

        Ok(WavSource {
            path: path.to_path_buf(),
            reader: Some(reader),
            spec,
            total_frames,
            chunk_frames: chunk_frames.max(1),
            position: 0,
            reader_position: 0,
            current: None,
            selected: false,
        })
    }

    /// Path this source was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn units(&self) -> PcmUnits {
        PcmUnits::new(self.spec.sample_rate, self.spec.channels)
    }

    fn frames_to_us(&self, frames: u32) -> i64 {
        self.units()
            .samples_to_us(frames as i64 * self.spec.channels as i64)
    }

    fn chunk_len_at(&self, position: u32) -> u32 {
        self.chunk_frames.min(self.total_frames.saturating_sub(position))
    }

    fn reader_mut(&mut self) -> Result<&mut WavReader<BufReader<File>>> {
        self.reader.as_mut().ok_or_else(|| ClipError::Container {
            reason: format!("{} has been released", self.path.display()),
        })
    }

    fn load_current(&mut self) -> Result<()> {
        if self.current.is_some() {
            return Ok(());
        }
        let position = self.position;
        let frames = self.chunk_len_at(position);
        let channels = self.spec.channels as usize;

        if self.reader_position != position {
            self.reader_mut()?.seek(position)?;
        }
        let reader = self.reader_mut()?;
        let mut bytes = Vec::with_capacity(frames as usize * channels * 2);
        for sample in reader.samples::<i16>().take(frames as usize * channels) {
            bytes.extend_from_slice(&sample?.to_le_bytes());
        }

        self.reader_position = position + frames;
        self.current = Some(bytes);
        Ok(())
    }
}

impl MediaSource for WavSource {
    fn track_count(&self) -> usize {
        1
    }

    fn track_format(&self, index: usize) -> Result<MediaFormat> {
        if index != 0 {
            return Err(ClipError::InvalidTrack { index });
        }
        let bit_rate = self.spec.sample_rate * self.spec.channels as u32 * BITS_PER_SAMPLE as u32;
        let chunk_bytes = self.chunk_frames as usize * self.units().frame_bytes();
        Ok(
            MediaFormat::audio(MIME_AUDIO_RAW, self.spec.sample_rate, self.spec.channels)
                .with_bit_rate(bit_rate)
                .with_duration_us(self.frames_to_us(self.total_frames))
                .with_max_input_size(chunk_bytes),
        )
    }

    fn select_track(&mut self, index: usize) -> Result<()> {
        if index != 0 {
            return Err(ClipError::InvalidTrack { index });
        }
        self.selected = true;
        Ok(())
    }

    fn seek_to(&mut self, time_us: i64, mode: SeekMode) -> Result<()> {
        let rate = self.spec.sample_rate as i64;
        let frame = (time_us.max(0) as i128 * rate as i128 / 1_000_000) as i64;
        let chunk = self.chunk_frames as i64;
        let aligned = match mode {
            SeekMode::PreviousSync => frame / chunk * chunk,
            SeekMode::NextSync => (frame + chunk - 1) / chunk * chunk,
            SeekMode::ClosestSync => (frame + chunk / 2) / chunk * chunk,
        };
        let target = aligned.clamp(0, self.total_frames as i64) as u32;

        self.reader_mut()?.seek(target)?;
        self.reader_position = target;
        self.position = target;
        self.current = None;
        debug!(
            "[WAV] Seek {}us ({}) -> frame {}",
            time_us, mode, target
        );
        Ok(())
    }

    fn read_sample(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        if !self.selected || self.position >= self.total_frames {
            return Ok(None);
        }
        self.load_current()?;
        let Some(bytes) = self.current.as_ref() else {
            return Ok(None);
        };
        if bytes.len() > buf.len() {
            return Err(ClipError::codec(
                "source",
                format!(
                    "access unit of {} bytes does not fit a {} byte input buffer",
                    bytes.len(),
                    buf.len()
                ),
            ));
        }
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Some(bytes.len()))
    }

    fn sample_time(&self) -> Option<i64> {
        if !self.selected || self.position >= self.total_frames {
            return None;
        }
        Some(self.frames_to_us(self.position))
    }

    fn sample_flags(&self) -> BufferFlags {
        BufferFlags::SYNC_FRAME
    }

    fn advance(&mut self) -> bool {
        if self.position >= self.total_frames {
            return false;
        }
        self.position += self.chunk_len_at(self.position);
        self.current = None;
        self.position < self.total_frames
    }

    fn release(&mut self) {
        self.reader = None;
        self.current = None;
        self.selected = false;
    }
}

// ============================================================================
// Container writer
// ============================================================================

/// Single-track WAV writer for `audio/raw` frames
pub struct WavContainer {
    path: PathBuf,
    spec: Option<WavSpec>,
    writer: Option<WavWriter<BufWriter<File>>>,
    samples_written: u64,
    finished: bool,
}

impl WavContainer {
    /// Prepare a writer for `path`. The file is created on `start`.
    pub fn create(path: &Path) -> Self {
        WavContainer {
            path: path.to_path_buf(),
            spec: None,
            writer: None,
            samples_written: 0,
            finished: false,
        }
    }

    /// Number of 16-bit samples written so far
    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    fn finalize(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
            debug!(
                "[WAV] Finalized {} ({} samples)",
                self.path.display(),
                self.samples_written
            );
        }
        self.finished = true;
        Ok(())
    }
}

impl ContainerWriter for WavContainer {
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize> {
        if self.spec.is_some() {
            return Err(ClipError::Container {
                reason: "a WAV file holds exactly one track".to_string(),
            });
        }
        if format.mime != MIME_AUDIO_RAW {
            return Err(ClipError::UnsupportedFormat {
                format: format!("{} in a WAV container", format.mime),
            });
        }
        let (Some(sample_rate), Some(channels)) = (format.sample_rate, format.channel_count) else {
            return Err(ClipError::UnsupportedFormat {
                format: "audio track without sample rate and channel count".to_string(),
            });
        };

        self.spec = Some(WavSpec {
            channels,
            sample_rate,
            bits_per_sample: BITS_PER_SAMPLE,
            sample_format: SampleFormat::Int,
        });
        Ok(0)
    }

    fn start(&mut self) -> Result<()> {
        if self.writer.is_some() || self.finished {
            return Ok(());
        }
        let spec = self.spec.ok_or_else(|| ClipError::Container {
            reason: "start called before a track was added".to_string(),
        })?;
        self.writer = Some(WavWriter::create(&self.path, spec)?);
        Ok(())
    }

    fn write_sample(&mut self, track_index: usize, data: &[u8], info: &BufferInfo) -> Result<()> {
        if track_index != 0 {
            return Err(ClipError::InvalidTrack { index: track_index });
        }
        let writer = self.writer.as_mut().ok_or_else(|| ClipError::Container {
            reason: "write_sample called before start".to_string(),
        })?;

        let end = (info.offset + info.size).min(data.len());
        let payload = &data[info.offset.min(end)..end];
        for pair in payload.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        }
        self.samples_written += (payload.len() / 2) as u64;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.finalize()
    }

    fn release(&mut self) {
        if let Err(e) = self.finalize() {
            warn!("[WAV] Failed to finalize {}: {}", self.path.display(), e);
        }
    }
}

// ============================================================================
// Test signal generation
// ============================================================================

/// Write a 16-bit sine tone WAV file
///
/// Every channel carries the same tone. Useful for exercising the pipeline
/// end to end.
///
/// # Arguments
/// * `path` - Destination file
/// * `frequency` - Frequency of the sine wave in Hz
/// * `duration_us` - Length of the file
/// * `sample_rate` - Sample rate in Hz
/// * `channels` - Channel count
/// * `amplitude` - Peak amplitude (0.0 to 1.0)
pub fn write_test_tone(
    path: &Path,
    frequency: f32,
    duration_us: i64,
    sample_rate: u32,
    channels: u16,
    amplitude: f32,
) -> Result<()> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;

    let frames = (duration_us.max(0) as i128 * sample_rate as i128 / 1_000_000) as usize;
    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
    let peak = amplitude.clamp(0.0, 1.0) * i16::MAX as f32;

    for i in 0..frames {
        let value = ((angular_freq * i as f32).sin() * peak) as i16;
        for _ in 0..channels {
            writer.write_sample(value)?;
        }
    }
    writer.finalize()?;
    Ok(())
}
