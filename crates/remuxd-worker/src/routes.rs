//! Worker API routes.

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers::{accept_task, cancel_task, cleanup, health, task_status, worker_status};
use crate::state::AppState;

/// Create the worker router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/process", post(accept_task))
        .route("/process/:task_id", delete(cancel_task))
        .route("/status", get(worker_status))
        .route("/status/:task_id", get(task_status))
        .route("/cleanup", post(cleanup))
        .route("/health", get(health));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
