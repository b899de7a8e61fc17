//! Error handling for audioclip
//!
//! Fatal conditions of a transcode session. Transient engine results
//! ("try again", "output format changed") are not errors and never appear here.

use thiserror::Error;

/// Result type alias for audioclip operations
pub type Result<T> = std::result::Result<T, ClipError>;

/// Main error type for audioclip operations
#[derive(Error, Debug)]
pub enum ClipError {
    // Precondition Errors
    #[error("No audio track found in source")]
    NoAudioTrack,

    #[error("Start time ({start_us}us) must be less than or equal to end time ({end_us}us)")]
    InvalidWindow { start_us: i64, end_us: i64 },

    #[error("Source track does not report a duration")]
    MissingDuration,

    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Source has no track {index}")]
    InvalidTrack { index: usize },

    // Engine Errors
    #[error("{engine} engine fault: {reason}")]
    CodecState { engine: &'static str, reason: String },

    #[error("{engine} engine has no buffer at index {index}")]
    InvalidBufferIndex { engine: &'static str, index: usize },

    // Muxing Errors
    #[error("Output container writer lock was poisoned")]
    WriterPoisoned,

    #[error("Container writer error: {reason}")]
    Container { reason: String },

    // Session Errors
    #[error("Pipeline is stopped and cannot be resumed")]
    PipelineStopped,

    #[error("Configuration error: {reason}")]
    Config { reason: String },

    // File Errors
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClipError {
    /// Shorthand for an engine fault
    pub fn codec(engine: &'static str, reason: impl Into<String>) -> Self {
        ClipError::CodecState {
            engine,
            reason: reason.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            ClipError::NoAudioTrack => "NO_AUDIO_TRACK",
            ClipError::InvalidWindow { .. } => "INVALID_WINDOW",
            ClipError::MissingDuration => "MISSING_DURATION",
            ClipError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            ClipError::InvalidTrack { .. } => "INVALID_TRACK",
            ClipError::CodecState { .. } => "CODEC_STATE",
            ClipError::InvalidBufferIndex { .. } => "INVALID_BUFFER_INDEX",
            ClipError::WriterPoisoned => "WRITER_POISONED",
            ClipError::Container { .. } => "CONTAINER_ERROR",
            ClipError::PipelineStopped => "PIPELINE_STOPPED",
            ClipError::Config { .. } => "CONFIG_ERROR",
            ClipError::FileNotFound { .. } => "FILE_NOT_FOUND",
            ClipError::Io(_) => "IO_ERROR",
            ClipError::Wav(_) => "WAV_ERROR",
            ClipError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error was raised before any decoding could start
    ///
    /// Precondition failures mean the session was never created; everything
    /// else aborts a running session.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ClipError::NoAudioTrack
                | ClipError::InvalidWindow { .. }
                | ClipError::MissingDuration
                | ClipError::UnsupportedFormat { .. }
                | ClipError::InvalidTrack { .. }
                | ClipError::Config { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ClipError::NoAudioTrack => vec![
                "Check that the source actually contains an audio stream",
                "Extract the audio with another tool and retry",
            ],
            ClipError::InvalidWindow { .. } => vec![
                "Make sure --start-us is not after --end-us",
                "Both values are clamped to the source duration first",
            ],
            ClipError::UnsupportedFormat { .. } => vec![
                "Convert the source to 16-bit PCM WAV",
                "Only 16-bit integer PCM sources are supported",
                "Set the target mime to audio/raw when encoding with PcmCodec",
                "Leave the target sample rate and channel count unset to keep the source layout",
            ],
            ClipError::FileNotFound { .. } => vec![
                "Check the file path is correct",
                "Verify the file hasn't been moved or deleted",
            ],
            _ => vec![],
        }
    }
}
