//! Value types shared by every engine interface
//!
//! Formats, buffer metadata and poll results exchanged between the pipeline
//! and the demuxer, codec and container collaborators.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mime type of interleaved 16-bit little-endian PCM
pub const MIME_AUDIO_RAW: &str = "audio/raw";

/// Mime type of AAC in an MPEG-4 transport
pub const MIME_AUDIO_AAC: &str = "audio/mp4a-latm";

/// Description of an elementary stream, as reported by a source or requested
/// from a codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFormat {
    pub mime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_count: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_us: Option<i64>,
    /// Largest input buffer the consumer of this format must accept
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_input_size: Option<usize>,
}

impl MediaFormat {
    /// Create a format carrying only a mime type
    pub fn new(mime: impl Into<String>) -> Self {
        MediaFormat {
            mime: mime.into(),
            sample_rate: None,
            channel_count: None,
            bit_rate: None,
            duration_us: None,
            max_input_size: None,
        }
    }

    /// Create an audio format with the three parameters every audio codec needs
    pub fn audio(mime: impl Into<String>, sample_rate: u32, channel_count: u16) -> Self {
        MediaFormat {
            sample_rate: Some(sample_rate),
            channel_count: Some(channel_count),
            ..MediaFormat::new(mime)
        }
    }

    pub fn with_bit_rate(mut self, bit_rate: u32) -> Self {
        self.bit_rate = Some(bit_rate);
        self
    }

    pub fn with_duration_us(mut self, duration_us: i64) -> Self {
        self.duration_us = Some(duration_us);
        self
    }

    pub fn with_max_input_size(mut self, max_input_size: usize) -> Self {
        self.max_input_size = Some(max_input_size);
        self
    }

    /// Whether this format describes an audio stream
    pub fn is_audio(&self) -> bool {
        self.mime.starts_with("audio/")
    }
}

/// Buffer flag bits, mirroring the flags container formats and codecs attach
/// to each access unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct BufferFlags(u32);

impl BufferFlags {
    pub const NONE: BufferFlags = BufferFlags(0);
    /// The buffer can be decoded without earlier buffers (also "key frame")
    pub const SYNC_FRAME: BufferFlags = BufferFlags(1);
    pub const CODEC_CONFIG: BufferFlags = BufferFlags(2);
    pub const END_OF_STREAM: BufferFlags = BufferFlags(4);

    pub fn from_bits(bits: u32) -> Self {
        BufferFlags(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: BufferFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_end_of_stream(self) -> bool {
        self.contains(BufferFlags::END_OF_STREAM)
    }
}

impl std::ops::BitOr for BufferFlags {
    type Output = BufferFlags;

    fn bitor(self, rhs: BufferFlags) -> BufferFlags {
        BufferFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for BufferFlags {
    fn bitor_assign(&mut self, rhs: BufferFlags) {
        self.0 |= rhs.0;
    }
}

/// Metadata of one queued or dequeued buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferInfo {
    /// Start of the payload inside the buffer
    pub offset: usize,
    /// Payload length in bytes
    pub size: usize,
    pub presentation_time_us: i64,
    pub flags: BufferFlags,
}

impl BufferInfo {
    pub fn new(offset: usize, size: usize, presentation_time_us: i64, flags: BufferFlags) -> Self {
        BufferInfo {
            offset,
            size,
            presentation_time_us,
            flags,
        }
    }

    /// An empty buffer that only signals end of stream
    pub fn end_of_stream() -> Self {
        BufferInfo::new(0, 0, 0, BufferFlags::END_OF_STREAM)
    }
}

/// Result of polling a codec for output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    /// Nothing available yet; call again later
    TryAgain,
    /// The output format is now known (or changed); read it with `output_format`
    FormatChanged,
    /// The set of output buffers was replaced; legacy engines only
    BuffersChanged,
    /// An output buffer is ready at `index`
    Buffer { index: usize, info: BufferInfo },
    /// Any other negative status the engine reports. Always fatal.
    Fault(i32),
}

/// Where a seek may land relative to the requested time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekMode {
    /// The closest sync sample at or before the requested time
    #[default]
    PreviousSync,
    /// The closest sync sample at or after the requested time
    NextSync,
    /// The closest sync sample in either direction
    ClosestSync,
}

impl fmt::Display for SeekMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeekMode::PreviousSync => write!(f, "previous-sync"),
            SeekMode::NextSync => write!(f, "next-sync"),
            SeekMode::ClosestSync => write!(f, "closest-sync"),
        }
    }
}
