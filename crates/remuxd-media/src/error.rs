//! Error types for disc analysis and remuxing.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during disc analysis and remuxing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("not a valid disc source: {0}")]
    InvalidSource(String),

    #[error("playlist parse error in {path}: {message}")]
    PlaylistParse { path: PathBuf, message: String },

    #[error("no title reaches the minimum feature duration of {minimum_minutes} minutes")]
    NoMainTitle { minimum_minutes: u64 },

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("promoted copy size mismatch: expected {expected} bytes, found {found}")]
    CopyVerification { expected: u64, found: u64 },

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn invalid_source(message: impl Into<String>) -> Self {
        Self::InvalidSource(message.into())
    }

    /// Deterministic analysis failures: another attempt on the same source
    /// cannot change the outcome.
    pub fn is_analysis_failure(&self) -> bool {
        matches!(
            self,
            MediaError::InvalidSource(_)
                | MediaError::PlaylistParse { .. }
                | MediaError::NoMainTitle { .. }
        )
    }
}
