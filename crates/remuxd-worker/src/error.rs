//! Worker error types.

use std::path::PathBuf;

use remuxd_media::MediaError;
use remuxd_models::{FailureKind, TaskId};
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker is busy processing task {0}")]
    Busy(TaskId),

    #[error("source directory not found: {0}")]
    SourceMissing(PathBuf),

    #[error("output too small: {bytes} bytes (minimum {minimum})")]
    OutputTooSmall { bytes: u64, minimum: u64 },

    #[error("callback delivery failed: {0}")]
    CallbackDelivery(String),

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    /// Classify the failure for the controller's retry policy.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            WorkerError::Media(MediaError::Cancelled) => FailureKind::Cancelled,
            WorkerError::Media(e) if e.is_analysis_failure() => FailureKind::Analysis,
            _ => FailureKind::Transcode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_classification() {
        let analysis = WorkerError::Media(MediaError::NoMainTitle { minimum_minutes: 60 });
        assert_eq!(analysis.failure_kind(), FailureKind::Analysis);

        let cancelled = WorkerError::Media(MediaError::Cancelled);
        assert_eq!(cancelled.failure_kind(), FailureKind::Cancelled);

        let transcode = WorkerError::OutputTooSmall {
            bytes: 10,
            minimum: 100,
        };
        assert_eq!(transcode.failure_kind(), FailureKind::Transcode);

        // a missing source may be a mount hiccup, so it stays retryable
        let missing = WorkerError::SourceMissing(PathBuf::from("/mnt/library/raw/X"));
        assert_eq!(missing.failure_kind(), FailureKind::Transcode);
    }
}
