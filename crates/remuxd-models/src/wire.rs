//! Controller <-> worker wire types.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::task::TaskId;

/// Accept request posted to the worker's process endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProcessRequest {
    pub task_id: TaskId,
    /// Source directory name under the raw library folder
    pub source_name: String,
    /// Source path as the controller sees it (informational for the worker)
    pub source_path: String,
    /// Generation the callbacks for this dispatch must carry
    pub dispatch_generation: u64,
    /// Webhook URL the worker reports status to
    pub callback_url: String,
}

/// Worker response to an accept request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProcessAccepted {
    pub accepted: bool,
    pub message: String,
    pub task_id: TaskId,
    /// Identifier of the accepting worker
    pub worker_id: String,
}

/// Snapshot of the worker's single job slot.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerStatus {
    /// Task occupying the slot, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub is_processing: bool,
    #[serde(default)]
    pub progress_percent: f64,
    /// Human-readable phase: "idle", "analyzing", "converting"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(default)]
    pub elapsed_seconds: f64,
}

impl WorkerStatus {
    /// The idle snapshot.
    pub fn idle() -> Self {
        Self {
            task_id: None,
            is_processing: false,
            progress_percent: 0.0,
            status: "idle".to_string(),
            source_name: None,
            elapsed_seconds: 0.0,
        }
    }
}

/// Worker lifecycle notification (startup/shutdown webhooks).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerEvent {
    pub worker_id: String,
    pub timestamp: DateTime<Utc>,
}

impl WorkerEvent {
    pub fn now(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            timestamp: Utc::now(),
        }
    }
}
