//! Task definitions and the lifecycle state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a conversion task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task lifecycle state.
///
/// The transition graph is enforced by [`Task::transition`]; any edge not
/// listed there is a protocol bug and is rejected, never applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to be claimed by the dispatcher
    #[default]
    Pending,
    /// Claimed and handed to the worker, awaiting acknowledgment
    Sent,
    /// Worker accepted and the remux is running
    Processing,
    /// Output promoted, source removed
    Completed,
    /// Permanently failed (attempt cap reached or non-retryable error)
    Failed,
    /// Waiting out the backoff delay before re-entering pending
    Retrying,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Sent => "sent",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Retrying => "retrying",
        }
    }

    /// Terminal states receive no further lifecycle transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Active tasks block a new task for the same source path.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether the lifecycle graph allows `self -> next`.
    pub fn can_transition(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Sent)
                | (Sent, Processing)
                | (Sent, Retrying)
                | (Processing, Completed)
                | (Processing, Retrying)
                | (Retrying, Pending)
                | (Retrying, Failed)
        )
    }

    /// Parse from the wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "sent" => Some(TaskStatus::Sent),
            "processing" => Some(TaskStatus::Processing),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "retrying" => Some(TaskStatus::Retrying),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal task transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// A unit of conversion work: one disc source directory, one output file.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Task {
    /// Unique task ID, assigned at creation
    pub id: TaskId,

    /// Directory name of the source (also the output file stem)
    pub source_name: String,

    /// Full path of the source directory; unique while the task is active
    pub source_path: PathBuf,

    /// Lifecycle state
    #[serde(default)]
    pub status: TaskStatus,

    /// Claim priority; higher claims first
    #[serde(default)]
    pub priority: i32,

    /// Dispatch/processing attempts consumed so far
    #[serde(default)]
    pub attempts: u32,

    /// Incremented on every claim; callbacks carrying an older generation
    /// are discarded as stale
    #[serde(default)]
    pub dispatch_generation: u64,

    /// Estimated total stream size of the source in bytes
    #[serde(default)]
    pub source_size: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,

    /// Set on the first transition into processing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,

    /// Set on reaching a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_completed_at: Option<DateTime<Utc>>,

    /// Earliest instant a retrying task may re-enter pending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,

    /// Last failure detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Final output location, populated on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    /// Final output size in bytes, populated on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size: Option<u64>,

    /// Wall-clock seconds the worker spent on the successful attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_seconds: Option<f64>,

    /// Identifier the worker reported on accept
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
}

impl Task {
    /// Create a new pending task for a source directory.
    pub fn new(
        source_name: impl Into<String>,
        source_path: impl Into<PathBuf>,
        source_size: u64,
        priority: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            source_name: source_name.into(),
            source_path: source_path.into(),
            status: TaskStatus::Pending,
            priority,
            attempts: 0,
            dispatch_generation: 0,
            source_size,
            created_at: now,
            updated_at: now,
            processing_started_at: None,
            processing_completed_at: None,
            next_retry_at: None,
            error_message: None,
            output_path: None,
            output_size: None,
            processing_time_seconds: None,
            worker_id: None,
        }
    }

    /// Apply a lifecycle transition, updating the bookkeeping timestamps.
    ///
    /// Returns [`TransitionError`] for any edge not in the lifecycle graph.
    /// The operator restart edge is separate, see [`Task::restart`].
    pub fn transition(&mut self, next: TaskStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        self.status = next;
        self.updated_at = now;

        match next {
            TaskStatus::Processing => {
                if self.processing_started_at.is_none() {
                    self.processing_started_at = Some(now);
                }
            }
            TaskStatus::Completed | TaskStatus::Failed => {
                self.processing_completed_at = Some(now);
                self.next_retry_at = None;
            }
            TaskStatus::Pending => {
                self.next_retry_at = None;
            }
            _ => {}
        }

        Ok(())
    }

    /// Claim the task: pending -> sent with a fresh dispatch generation.
    pub fn claim(&mut self) -> Result<u64, TransitionError> {
        self.transition(TaskStatus::Sent)?;
        self.dispatch_generation += 1;
        Ok(self.dispatch_generation)
    }

    /// Operator restart: terminal -> pending with attempts and results reset.
    pub fn restart(&mut self) -> Result<(), TransitionError> {
        if !self.status.is_terminal() {
            return Err(TransitionError {
                from: self.status,
                to: TaskStatus::Pending,
            });
        }

        self.status = TaskStatus::Pending;
        self.attempts = 0;
        self.error_message = None;
        self.output_path = None;
        self.output_size = None;
        self.processing_time_seconds = None;
        self.processing_started_at = None;
        self.processing_completed_at = None;
        self.next_retry_at = None;
        self.worker_id = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Seconds since the last mutation, used by the stale-task safeguard.
    pub fn seconds_since_update(&self, now: DateTime<Utc>) -> i64 {
        (now - self.updated_at).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_creation() {
        let task = Task::new("Inception", "/library/raw/Inception", 40_000_000_000, 0);

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempts, 0);
        assert_eq!(task.dispatch_generation, 0);
        assert!(task.processing_started_at.is_none());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut task = Task::new("Movie", "/library/raw/Movie", 0, 0);

        let generation = task.claim().unwrap();
        assert_eq!(generation, 1);
        assert_eq!(task.status, TaskStatus::Sent);

        task.transition(TaskStatus::Processing).unwrap();
        assert!(task.processing_started_at.is_some());

        task.transition(TaskStatus::Completed).unwrap();
        assert!(task.processing_completed_at.is_some());
        assert!(task.status.is_terminal());
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut task = Task::new("Movie", "/library/raw/Movie", 0, 0);

        // pending -> completed is not an edge
        let err = task.transition(TaskStatus::Completed).unwrap_err();
        assert_eq!(err.from, TaskStatus::Pending);
        assert_eq!(err.to, TaskStatus::Completed);
        // state is untouched after rejection
        assert_eq!(task.status, TaskStatus::Pending);

        // pending -> processing must go through sent
        assert!(task.transition(TaskStatus::Processing).is_err());
    }

    #[test]
    fn test_retry_cycle() {
        let mut task = Task::new("Movie", "/library/raw/Movie", 0, 0);
        task.claim().unwrap();
        task.transition(TaskStatus::Processing).unwrap();
        task.transition(TaskStatus::Retrying).unwrap();
        task.transition(TaskStatus::Pending).unwrap();

        // re-claim bumps the generation again
        let generation = task.claim().unwrap();
        assert_eq!(generation, 2);
    }

    #[test]
    fn test_restart_resets_bookkeeping() {
        let mut task = Task::new("Movie", "/library/raw/Movie", 0, 0);
        task.claim().unwrap();
        task.transition(TaskStatus::Retrying).unwrap();
        task.attempts = 3;
        task.transition(TaskStatus::Failed).unwrap();
        task.error_message = Some("worker unreachable".into());

        task.restart().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempts, 0);
        assert!(task.error_message.is_none());

        // restart of a live task is refused
        let mut live = Task::new("Other", "/library/raw/Other", 0, 0);
        assert!(live.restart().is_err());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Sent,
            TaskStatus::Processing,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Retrying,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("queued"), None);
    }
}
