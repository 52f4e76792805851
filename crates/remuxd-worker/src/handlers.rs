//! Worker HTTP handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use remuxd_models::{ProcessAccepted, ProcessRequest, TaskId, WorkerStatus};

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub worker_id: String,
    pub uptime_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task: Option<TaskId>,
}

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        worker_id: state.config.worker_id.clone(),
        uptime_seconds: state.started_at.elapsed().as_secs_f64(),
        current_task: state.slot.current_task_id(),
    })
}

/// Accept a conversion task.
///
/// The slot is the only admission control: if another job holds it the
/// request is answered 409 and the controller treats it as a transient
/// busy signal. On acquire the pipeline runs in a spawned task and the
/// request returns immediately; completion arrives via callback.
pub async fn accept_task(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> Result<Json<ProcessAccepted>, (StatusCode, Json<ProcessAccepted>)> {
    match state.slot.try_acquire(&request.task_id, &request.source_name) {
        Ok(lease) => {
            info!(
                task_id = %request.task_id,
                generation = request.dispatch_generation,
                source = %request.source_name,
                "Accepted conversion task"
            );

            let accepted = ProcessAccepted {
                accepted: true,
                message: format!("processing started for task {}", request.task_id),
                task_id: request.task_id.clone(),
                worker_id: state.config.worker_id.clone(),
            };

            let processor = state.processor.clone();
            tokio::spawn(async move {
                processor.process(request, lease).await;
            });

            Ok(Json(accepted))
        }
        Err(holder) => {
            warn!(
                task_id = %request.task_id,
                holder = %holder,
                "Rejecting task, slot is busy"
            );
            Err((
                StatusCode::CONFLICT,
                Json(ProcessAccepted {
                    accepted: false,
                    message: format!("worker is busy processing task {holder}"),
                    task_id: request.task_id,
                    worker_id: state.config.worker_id.clone(),
                }),
            ))
        }
    }
}

/// Overall worker status (idle or the active job snapshot).
pub async fn worker_status(State(state): State<AppState>) -> Json<WorkerStatus> {
    Json(state.slot.status())
}

/// Status of one specific task; 404 unless it occupies the slot.
pub async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<WorkerStatus>, StatusCode> {
    let status = state.slot.status();
    match &status.task_id {
        Some(active) if active.as_str() == task_id => Ok(Json(status)),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub message: String,
}

/// Cancel the active job. The subprocess is killed best effort; partial
/// output cleanup and the cancelled callback happen in the pipeline.
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<CancelResponse>, StatusCode> {
    let task_id = TaskId::from_string(task_id);
    if state.slot.request_cancel(&task_id) {
        Ok(Json(CancelResponse {
            success: true,
            message: format!("cancellation requested for task {task_id}"),
        }))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

#[derive(Deserialize)]
pub struct CleanupParams {
    #[serde(default = "default_cleanup_hours")]
    pub older_than_hours: u64,
}

fn default_cleanup_hours() -> u64 {
    24
}

#[derive(Serialize)]
pub struct CleanupResponse {
    pub removed: u32,
}

/// Delete staged outputs older than the given age.
pub async fn cleanup(
    State(state): State<AppState>,
    Query(params): Query<CleanupParams>,
) -> Result<Json<CleanupResponse>, StatusCode> {
    match state
        .processor
        .cleanup_staging(params.older_than_hours)
        .await
    {
        Ok(removed) => Ok(Json(CleanupResponse { removed })),
        Err(e) => {
            warn!("Cleanup failed: {e}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
