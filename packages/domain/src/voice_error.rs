//! Unified error for every voxweave operation.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error covering segmentation, blending, synthesis and storage.
#[derive(Debug, Clone, Error)]
pub enum VoiceError {
    /// Voice and weight lists disagree in length, or are empty.
    #[error("voice/weight arity mismatch: {voices} voices, {weights} weights")]
    ArityMismatch { voices: usize, weights: usize },
    /// Request failed validation before any engine work.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Voice identifier did not resolve to reference audio or an embedding.
    #[error("voice not found: {0}")]
    VoiceNotFound(String),
    /// The synthesis engine reported a failure.
    #[error("synthesis: {0}")]
    SynthesisFailed(String),
    /// Synthesis did not finish inside the configured bound.
    #[error("synthesis timed out after {secs}s")]
    SynthesisTimeout { secs: u64 },
    /// Files to be stitched disagree on sample rate.
    #[error("sample rate mismatch in {}: expected {expected} Hz, found {found} Hz", path.display())]
    SampleRateMismatch {
        expected: u32,
        found: u32,
        path: PathBuf,
    },
    /// Audio could not be decoded or is of an unsupported shape.
    #[error("audio decode: {0}")]
    AudioDecode(String),
    /// A residency move was requested but no accelerator is present.
    #[error("residency transition unavailable: {0}")]
    ResidencyTransitionUnavailable(String),
    /// Fetching a remote voice failed.
    #[error("download {url}: {reason}")]
    Download { url: String, reason: String },
    /// Filesystem failure while reading or writing artifacts.
    #[error("storage {}: {reason}", path.display())]
    Storage { path: PathBuf, reason: String },
    /// Configuration-related failure reason.
    #[error("configuration: {0}")]
    Configuration(String),
}

/// Stable, serializable discriminant of [`VoiceError`] for callers that
/// branch on the failure class (HTTP mapping, logs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ArityMismatch,
    InvalidRequest,
    VoiceNotFound,
    SynthesisFailed,
    SynthesisTimeout,
    SampleRateMismatch,
    AudioDecodeError,
    ResidencyTransitionUnavailable,
    Download,
    Storage,
    Configuration,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ArityMismatch => "arity_mismatch",
            Self::InvalidRequest => "invalid_request",
            Self::VoiceNotFound => "voice_not_found",
            Self::SynthesisFailed => "synthesis_failed",
            Self::SynthesisTimeout => "synthesis_timeout",
            Self::SampleRateMismatch => "sample_rate_mismatch",
            Self::AudioDecodeError => "audio_decode_error",
            Self::ResidencyTransitionUnavailable => "residency_transition_unavailable",
            Self::Download => "download",
            Self::Storage => "storage",
            Self::Configuration => "configuration",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl VoiceError {
    /// Failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ArityMismatch { .. } => ErrorKind::ArityMismatch,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::VoiceNotFound(_) => ErrorKind::VoiceNotFound,
            Self::SynthesisFailed(_) => ErrorKind::SynthesisFailed,
            Self::SynthesisTimeout { .. } => ErrorKind::SynthesisTimeout,
            Self::SampleRateMismatch { .. } => ErrorKind::SampleRateMismatch,
            Self::AudioDecode(_) => ErrorKind::AudioDecodeError,
            Self::ResidencyTransitionUnavailable(_) => ErrorKind::ResidencyTransitionUnavailable,
            Self::Download { .. } => ErrorKind::Download,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Wrap an I/O failure against `path`.
    pub fn storage(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Storage {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    /// `true` when the caller supplied something unusable, as opposed to an
    /// engine or environment failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ArityMismatch | ErrorKind::InvalidRequest | ErrorKind::VoiceNotFound
        )
    }
}
