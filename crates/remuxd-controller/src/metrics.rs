//! Prometheus metrics for the controller.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "remuxd_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "remuxd_http_request_duration_seconds";

    // Task lifecycle metrics
    pub const TASKS_CREATED_TOTAL: &str = "remuxd_tasks_created_total";
    pub const TASKS_DISPATCHED_TOTAL: &str = "remuxd_tasks_dispatched_total";
    pub const TASKS_COMPLETED_TOTAL: &str = "remuxd_tasks_completed_total";
    pub const TASKS_FAILED_TOTAL: &str = "remuxd_tasks_failed_total";
    pub const TASKS_RETRIED_TOTAL: &str = "remuxd_tasks_retried_total";
    pub const TASKS_PENDING: &str = "remuxd_tasks_pending";

    // Processing metrics
    pub const REMUX_DURATION_SECONDS: &str = "remuxd_remux_duration_seconds";
    pub const OUTPUT_BYTES_TOTAL: &str = "remuxd_output_bytes_total";
}

pub fn record_task_created() {
    counter!(names::TASKS_CREATED_TOTAL).increment(1);
}

pub fn record_task_dispatched() {
    counter!(names::TASKS_DISPATCHED_TOTAL).increment(1);
}

pub fn record_task_completed(duration_secs: f64, output_bytes: u64) {
    counter!(names::TASKS_COMPLETED_TOTAL).increment(1);
    counter!(names::OUTPUT_BYTES_TOTAL).increment(output_bytes);
    histogram!(names::REMUX_DURATION_SECONDS).record(duration_secs);
}

pub fn record_task_failed(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::TASKS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_task_retried() {
    counter!(names::TASKS_RETRIED_TOTAL).increment(1);
}

pub fn set_pending_tasks(count: u64) {
    gauge!(names::TASKS_PENDING).set(count as f64);
}

fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Sanitize path for metrics labels (collapse task ids).
fn sanitize_path(path: &str) -> String {
    let path = regex_lite::Regex::new(
        r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}",
    )
    .expect("valid regex")
    .replace_all(path, ":task_id");
    path.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    record_http_request(&method, &path, status, start.elapsed().as_secs_f64());

    response
}
