//! Append-only processing attempt records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::task::TaskId;

/// Outcome of a single dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Remux finished and the output was promoted
    Completed,
    /// Worker reported a processing failure
    Failed,
    /// Operator cancelled the running job
    Cancelled,
    /// The task never reached the worker
    DispatchFailed,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Completed => "completed",
            AttemptOutcome::Failed => "failed",
            AttemptOutcome::Cancelled => "cancelled",
            AttemptOutcome::DispatchFailed => "dispatch_failed",
        }
    }
}

/// One record per dispatch attempt, immutable once written.
///
/// Keyed by `(task_id, generation)` so a duplicate callback delivery cannot
/// append a second record for the same attempt.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProcessingAttemptRecord {
    /// Task the attempt belongs to
    pub task_id: TaskId,
    /// Dispatch generation the attempt ran under
    pub generation: u64,
    /// How the attempt ended
    pub outcome: AttemptOutcome,
    /// Wall-clock duration of the attempt in seconds, where known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Failure detail, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the record was written
    pub recorded_at: DateTime<Utc>,
}

impl ProcessingAttemptRecord {
    pub fn new(task_id: TaskId, generation: u64, outcome: AttemptOutcome) -> Self {
        Self {
            task_id,
            generation,
            outcome,
            duration_seconds: None,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_record_builder() {
        let record = ProcessingAttemptRecord::new(TaskId::new(), 2, AttemptOutcome::Failed)
            .with_duration(123.4)
            .with_error("remux exited with status 1");

        assert_eq!(record.generation, 2);
        assert_eq!(record.outcome, AttemptOutcome::Failed);
        assert_eq!(record.duration_seconds, Some(123.4));
        assert!(record.error.is_some());
    }
}
