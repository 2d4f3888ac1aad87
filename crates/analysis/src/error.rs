//! Error types for the analysis engine.

use thiserror::Error;

/// Errors that can abort an analysis run.
///
/// Degenerate signal conditions (silence, too few onsets, tracks too short
/// for a loudness range) are *not* errors; the affected analyzer emits its
/// documented default instead. Only precondition violations and external
/// interruptions surface here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// The external decoder could not produce PCM. The message is passed
    /// through verbatim.
    #[error("decoding failed: {0}")]
    DecodingFailed(String),

    /// Fewer PCM samples than one second of audio.
    #[error("insufficient audio data: {samples} samples, need at least {required}")]
    InsufficientData { samples: usize, required: usize },

    /// A configuration parameter was rejected at construction time.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The soft deadline elapsed between stages.
    #[error("analysis timed out")]
    Timeout,

    /// The cancel token was triggered between stages.
    #[error("analysis cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AnalysisError>;
