//! Controller API routes.

use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::health;
use crate::handlers::tasks::{
    cancel_task, delete_task, get_task, list_tasks, purge_tasks, restart_task, set_priority,
    statistics, trigger_scan,
};
use crate::handlers::webhook::{status_callback, worker_shutdown, worker_startup};
use crate::metrics::metrics_middleware;
use crate::state::AppState;

/// Create the controller router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let task_routes = Router::new()
        .route("/tasks", get(list_tasks))
        .route("/tasks/scan", post(trigger_scan))
        .route("/tasks/:task_id", get(get_task))
        .route("/tasks/:task_id", delete(delete_task))
        .route("/tasks/:task_id/restart", post(restart_task))
        .route("/tasks/:task_id/cancel", post(cancel_task))
        .route("/tasks/:task_id/priority", post(set_priority))
        .route("/maintenance/purge", post(purge_tasks))
        .route("/statistics", get(statistics));

    let webhook_routes = Router::new()
        .route("/webhook/status", post(status_callback))
        .route("/webhook/worker/startup", post(worker_startup))
        .route("/webhook/worker/shutdown", post(worker_shutdown));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", task_routes.merge(webhook_routes))
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(parsed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
