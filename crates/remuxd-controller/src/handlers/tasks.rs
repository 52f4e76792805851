//! Task management handlers (the surface the UI/CLI layer consumes).

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use remuxd_models::{Task, TaskId, TaskStatistics, TaskStatus};
use remuxd_store::TaskFilter;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
}

/// List tasks, optionally filtered by status.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Task>>> {
    let filter = match params.status.as_deref() {
        Some(raw) => {
            let status = TaskStatus::parse(raw).ok_or_else(|| {
                ApiError::bad_request(format!(
                    "invalid status '{raw}' (expected pending|sent|processing|completed|failed|retrying)"
                ))
            })?;
            TaskFilter::with_status(status)
        }
        None => TaskFilter::default(),
    };

    Ok(Json(state.tasks.list_tasks(&filter).await?))
}

/// Fetch one task.
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Task>> {
    let task = state.tasks.get_task(&TaskId::from_string(task_id)).await?;
    Ok(Json(task))
}

#[derive(Serialize)]
pub struct ScanResponse {
    pub success: bool,
    pub message: String,
}

/// Trigger a background scan. A scan already in progress is not stacked;
/// the trigger reports a conflict instead.
pub async fn trigger_scan(State(state): State<AppState>) -> ApiResult<Json<ScanResponse>> {
    let Ok(guard) = state.scan_lock.clone().try_lock_owned() else {
        return Err(ApiError::conflict("a scan is already in progress"));
    };

    info!("Manual scan triggered");
    let scanner = state.scanner.clone();
    tokio::spawn(async move {
        let _guard = guard;
        match scanner.scan().await {
            Ok(report) => info!(
                created = report.tasks_created,
                examined = report.examined,
                "Triggered scan finished"
            ),
            Err(e) => error!("Triggered scan failed: {e}"),
        }
    });

    Ok(Json(ScanResponse {
        success: true,
        message: "scan started in background".to_string(),
    }))
}

#[derive(Serialize)]
pub struct TaskActionResponse {
    pub success: bool,
    pub message: String,
    pub task_id: TaskId,
}

/// Restart a terminal task: back to pending with attempts reset.
pub async fn restart_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskActionResponse>> {
    let task_id = TaskId::from_string(task_id);
    state.tasks.restart_task(&task_id).await?;

    Ok(Json(TaskActionResponse {
        success: true,
        message: format!("task {task_id} restarted"),
        task_id,
    }))
}

/// Ask the worker to abort the active conversion of this task.
///
/// The worker kills the subprocess, cleans its partial output and reports a
/// cancelled outcome through the normal callback path, where it counts as a
/// failed attempt.
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskActionResponse>> {
    let task_id = TaskId::from_string(task_id);
    let task = state.tasks.get_task(&task_id).await?;

    if !matches!(task.status, TaskStatus::Sent | TaskStatus::Processing) {
        return Err(ApiError::conflict(format!(
            "task {task_id} is not in flight (status: {})",
            task.status
        )));
    }

    let cancelled = state
        .worker
        .cancel(&task_id)
        .await
        .map_err(|e| ApiError::internal(format!("cancel request failed: {e}")))?;
    if !cancelled {
        return Err(ApiError::not_found(format!(
            "worker has no active job for task {task_id}"
        )));
    }

    info!(task_id = %task_id, "Cancellation forwarded to worker");
    Ok(Json(TaskActionResponse {
        success: true,
        message: format!("cancellation requested for task {task_id}"),
        task_id,
    }))
}

/// Delete a task (refused while processing).
pub async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskActionResponse>> {
    let task_id = TaskId::from_string(task_id);
    state.tasks.delete_task(&task_id).await?;

    Ok(Json(TaskActionResponse {
        success: true,
        message: format!("task {task_id} deleted"),
        task_id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PriorityParams {
    pub priority: i32,
}

/// Set a task's claim priority.
pub async fn set_priority(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Query(params): Query<PriorityParams>,
) -> ApiResult<Json<TaskActionResponse>> {
    let task_id = TaskId::from_string(task_id);
    state.tasks.set_priority(&task_id, params.priority).await?;

    Ok(Json(TaskActionResponse {
        success: true,
        message: format!("task {task_id} priority set to {}", params.priority),
        task_id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PurgeParams {
    pub days: Option<i64>,
}

#[derive(Serialize)]
pub struct PurgeResponse {
    pub purged: u32,
}

/// Purge terminal tasks past the retention window.
pub async fn purge_tasks(
    State(state): State<AppState>,
    Query(params): Query<PurgeParams>,
) -> ApiResult<Json<PurgeResponse>> {
    let days = params.days.unwrap_or(state.config.retention_days);
    if days < 1 {
        return Err(ApiError::bad_request("retention must be at least one day"));
    }

    let purged = state.tasks.purge_older_than(days).await?;
    Ok(Json(PurgeResponse { purged }))
}

/// Aggregate statistics.
pub async fn statistics(State(state): State<AppState>) -> ApiResult<Json<TaskStatistics>> {
    Ok(Json(state.tasks.statistics().await?))
}
