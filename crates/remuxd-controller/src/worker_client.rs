//! HTTP client for the worker's accept/status/cancel endpoints.

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use remuxd_models::{ProcessAccepted, ProcessRequest, TaskId, WorkerStatus};

/// Dispatch failure taxonomy, as seen from the controller.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Connect or timeout error: the worker never saw the request
    #[error("worker unreachable: {0}")]
    Unreachable(String),

    /// The worker's job slot is occupied. Should not occur under correct
    /// claim logic, handled defensively as transient.
    #[error("worker is busy")]
    Busy,

    /// The worker answered but refused the request
    #[error("worker rejected the request: {0}")]
    Rejected(String),
}

impl DispatchError {
    /// Transient faults are retried on the fixed dispatch interval.
    pub fn is_transient(&self) -> bool {
        matches!(self, DispatchError::Unreachable(_) | DispatchError::Busy)
    }
}

/// Worker operations the dispatcher and the stale safeguard depend on.
#[async_trait]
pub trait WorkerApi: Send + Sync {
    /// Hand a claimed task to the worker's accept endpoint.
    async fn send_task(&self, request: &ProcessRequest) -> Result<ProcessAccepted, DispatchError>;

    /// Snapshot of the worker's job slot.
    async fn status(&self) -> Result<WorkerStatus, DispatchError>;

    /// Request cancellation of the active job.
    async fn cancel(&self, task_id: &TaskId) -> Result<bool, DispatchError>;

    /// Liveness probe.
    async fn health(&self) -> bool;
}

/// Reqwest-backed worker client.
pub struct HttpWorkerClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpWorkerClient {
    pub fn new(base_url: impl Into<String>, accept_timeout: std::time::Duration) -> Result<Self, DispatchError> {
        let http = reqwest::Client::builder()
            .timeout(accept_timeout)
            .build()
            .map_err(|e| DispatchError::Rejected(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl WorkerApi for HttpWorkerClient {
    async fn send_task(&self, request: &ProcessRequest) -> Result<ProcessAccepted, DispatchError> {
        let response = self
            .http
            .post(self.url("/api/process"))
            .json(request)
            .send()
            .await
            .map_err(|e| DispatchError::Unreachable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => response
                .json::<ProcessAccepted>()
                .await
                .map_err(|e| DispatchError::Rejected(format!("malformed accept response: {e}"))),
            StatusCode::CONFLICT | StatusCode::TOO_MANY_REQUESTS => Err(DispatchError::Busy),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(DispatchError::Rejected(format!("{status}: {body}")))
            }
        }
    }

    async fn status(&self) -> Result<WorkerStatus, DispatchError> {
        let response = self
            .http
            .get(self.url("/api/status"))
            .send()
            .await
            .map_err(|e| DispatchError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DispatchError::Rejected(response.status().to_string()));
        }

        response
            .json::<WorkerStatus>()
            .await
            .map_err(|e| DispatchError::Rejected(format!("malformed status response: {e}")))
    }

    async fn cancel(&self, task_id: &TaskId) -> Result<bool, DispatchError> {
        let response = self
            .http
            .delete(self.url(&format!("/api/process/{task_id}")))
            .send()
            .await
            .map_err(|e| DispatchError::Unreachable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(DispatchError::Rejected(status.to_string())),
        }
    }

    async fn health(&self) -> bool {
        match self.http.get(self.url("/api/health")).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Worker health check failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DispatchError::Unreachable("connect refused".into()).is_transient());
        assert!(DispatchError::Busy.is_transient());
        assert!(!DispatchError::Rejected("400".into()).is_transient());
    }

    #[test]
    fn test_base_url_normalization() {
        let client =
            HttpWorkerClient::new("http://mac:8001/", std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(client.url("/api/process"), "http://mac:8001/api/process");
    }
}
