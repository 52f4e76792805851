//! Worker-facing webhook handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::{info, warn};

use remuxd_models::{StatusCallback, WorkerEvent};

use crate::error::ApiResult;
use crate::reconciler::ReconcileOutcome;
use crate::state::AppState;

#[derive(Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
}

/// Receive a status callback from the worker.
///
/// Stale and duplicate deliveries are acknowledged with 200 since
/// redelivering them cannot help. Only a failed promotion answers 500, which
/// makes the worker redeliver and thereby retry the promotion.
pub async fn status_callback(
    State(state): State<AppState>,
    Json(callback): Json<StatusCallback>,
) -> ApiResult<Json<WebhookResponse>> {
    let task_id = callback.task_id().clone();
    let outcome = state.reconciler.handle(callback).await?;

    let message = match outcome {
        ReconcileOutcome::ProgressRecorded => "progress recorded",
        ReconcileOutcome::Completed => "completion recorded",
        ReconcileOutcome::RetryScheduled => "failure recorded, retry scheduled",
        ReconcileOutcome::FailedPermanently => "failure recorded",
        ReconcileOutcome::Discarded => "stale callback discarded",
        ReconcileOutcome::AlreadyTerminal => "task already finished",
    };

    Ok(Json(WebhookResponse {
        success: true,
        message: format!("{message} for task {task_id}"),
    }))
}

/// Worker came online.
pub async fn worker_startup(
    State(state): State<AppState>,
    Json(event): Json<WorkerEvent>,
) -> Json<WebhookResponse> {
    info!(worker_id = %event.worker_id, "Worker online");
    state
        .notifier
        .notify(format!("Worker online: {}", event.worker_id));

    Json(WebhookResponse {
        success: true,
        message: format!("worker {} startup acknowledged", event.worker_id),
    })
}

/// Worker is going away: requeue anything it held.
pub async fn worker_shutdown(
    State(state): State<AppState>,
    Json(event): Json<WorkerEvent>,
) -> ApiResult<Json<WebhookResponse>> {
    warn!(worker_id = %event.worker_id, "Worker offline");

    let reset = state.tasks.reset_inflight_to_pending().await?;
    if reset > 0 {
        warn!(reset, "In-flight tasks reset to pending after worker shutdown");
    }
    state.notifier.notify(format!(
        "Worker offline: {} ({reset} task(s) requeued)",
        event.worker_id
    ));

    Ok(Json(WebhookResponse {
        success: true,
        message: format!("worker {} shutdown acknowledged", event.worker_id),
    }))
}
