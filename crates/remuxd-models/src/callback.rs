//! Worker -> controller callback payloads.
//!
//! Every callback carries the `dispatch_generation` it was issued under; the
//! reconciler discards callbacks whose generation no longer matches the task,
//! so a late delivery from a superseded dispatch cannot corrupt a newer
//! attempt's outcome.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::task::TaskId;

/// Classification of a worker-side failure.
///
/// Drives the reconciler's retry policy: analysis failures are deterministic
/// and never retried, transcode and cancellation failures count against the
/// conversion attempt cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No usable primary title (or unreadable disc structure)
    Analysis,
    /// The remux subprocess failed or produced unusable output
    Transcode,
    /// The job was cancelled on request
    Cancelled,
}

impl FailureKind {
    /// Whether another attempt can change the outcome.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureKind::Analysis)
    }
}

/// Status callback delivered to the controller webhook.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusCallback {
    /// The worker accepted the job and the remux is underway.
    Processing {
        task_id: TaskId,
        dispatch_generation: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        progress_percent: Option<f64>,
    },
    /// The remux finished; the output awaits promotion.
    Completed {
        task_id: TaskId,
        dispatch_generation: u64,
        /// Output file name under the shared staging directory
        output_location: String,
        processing_time_seconds: f64,
        output_size_bytes: u64,
    },
    /// The attempt failed.
    Failed {
        task_id: TaskId,
        dispatch_generation: u64,
        error: String,
        failure_kind: FailureKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        processing_time_seconds: Option<f64>,
    },
}

impl StatusCallback {
    pub fn task_id(&self) -> &TaskId {
        match self {
            StatusCallback::Processing { task_id, .. }
            | StatusCallback::Completed { task_id, .. }
            | StatusCallback::Failed { task_id, .. } => task_id,
        }
    }

    pub fn dispatch_generation(&self) -> u64 {
        match self {
            StatusCallback::Processing {
                dispatch_generation,
                ..
            }
            | StatusCallback::Completed {
                dispatch_generation,
                ..
            }
            | StatusCallback::Failed {
                dispatch_generation,
                ..
            } => *dispatch_generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_payload_shape() {
        let callback = StatusCallback::Completed {
            task_id: TaskId::from_string("t-1"),
            dispatch_generation: 3,
            output_location: "Inception_2h28m11s.mkv".into(),
            processing_time_seconds: 1812.5,
            output_size_bytes: 45_000_000_000,
        };

        let json = serde_json::to_value(&callback).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["task_id"], "t-1");
        assert_eq!(json["dispatch_generation"], 3);
        assert_eq!(json["output_size_bytes"], 45_000_000_000u64);
    }

    #[test]
    fn test_failure_payload_round_trip() {
        let callback = StatusCallback::Failed {
            task_id: TaskId::from_string("t-2"),
            dispatch_generation: 1,
            error: "ffmpeg exited with status 1".into(),
            failure_kind: FailureKind::Transcode,
            processing_time_seconds: Some(42.0),
        };

        let json = serde_json::to_string(&callback).unwrap();
        let parsed: StatusCallback = serde_json::from_str(&json).unwrap();
        match parsed {
            StatusCallback::Failed { failure_kind, .. } => {
                assert_eq!(failure_kind, FailureKind::Transcode);
                assert!(failure_kind.is_retryable());
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_analysis_failures_not_retryable() {
        assert!(!FailureKind::Analysis.is_retryable());
        assert!(FailureKind::Cancelled.is_retryable());
    }
}
