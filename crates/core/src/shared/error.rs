use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of a [`TranscodeError`], stable across the
/// detail messages carried by each variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NoAudioTrack,
    OpenFailed,
    CreateFailed,
    StartFailed,
    AppendFailed,
    DecodeFailed,
    FinalizeFailed,
    Cancelled,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranscodeError {
    #[error("no audio track in {path}")]
    NoAudioTrack { path: PathBuf },
    #[error("failed to open {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },
    #[error("failed to create {path}: {reason}")]
    CreateFailed { path: PathBuf, reason: String },
    #[error("failed to start {stage}: {reason}")]
    StartFailed { stage: &'static str, reason: String },
    #[error("sink rejected buffer: {0}")]
    AppendFailed(String),
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    #[error("failed to finalize {path}: {reason}")]
    FinalizeFailed { path: PathBuf, reason: String },
    #[error("transcode cancelled")]
    Cancelled,
}

impl TranscodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranscodeError::NoAudioTrack { .. } => ErrorKind::NoAudioTrack,
            TranscodeError::OpenFailed { .. } => ErrorKind::OpenFailed,
            TranscodeError::CreateFailed { .. } => ErrorKind::CreateFailed,
            TranscodeError::StartFailed { .. } => ErrorKind::StartFailed,
            TranscodeError::AppendFailed(_) => ErrorKind::AppendFailed,
            TranscodeError::DecodeFailed(_) => ErrorKind::DecodeFailed,
            TranscodeError::FinalizeFailed { .. } => ErrorKind::FinalizeFailed,
            TranscodeError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn open_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        TranscodeError::OpenFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn create_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        TranscodeError::CreateFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn start_failed(stage: &'static str, reason: impl ToString) -> Self {
        TranscodeError::StartFailed {
            stage,
            reason: reason.to_string(),
        }
    }

    /// Reports `self` as a rejected buffer, keeping an existing
    /// `AppendFailed` as it is.
    pub(crate) fn into_append_failed(self) -> Self {
        match self {
            TranscodeError::AppendFailed(_) => self,
            other => TranscodeError::AppendFailed(other.to_string()),
        }
    }
}
