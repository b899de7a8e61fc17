//! Media engine boundary
//!
//! The interfaces the pipeline drives (demuxer, codec, container writer),
//! their shared value types, and the implementations that ship with the
//! crate:
//! - `PcmCodec` for `audio/raw` streams
//! - `WavSource` / `WavContainer` for 16-bit PCM WAV files

pub mod codec;
pub mod container;
pub mod format;
pub mod io;
pub mod pcm;
pub mod source;

pub use codec::{Codec, CodecRole};
pub use container::{shared, ContainerWriter, SharedWriter};
pub use format::{
    BufferFlags, BufferInfo, MediaFormat, OutputStatus, SeekMode, MIME_AUDIO_AAC, MIME_AUDIO_RAW,
};
pub use io::{write_test_tone, WavContainer, WavSource};
pub use pcm::PcmCodec;
pub use source::{find_audio_track, MediaSource};
