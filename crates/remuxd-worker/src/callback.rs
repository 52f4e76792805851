//! Callback delivery to the controller webhook.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, warn};

use remuxd_models::{StatusCallback, WorkerEvent};

use crate::error::{WorkerError, WorkerResult};
use crate::retry::{retry_async, RetryConfig};

/// HTTP client for worker -> controller reporting.
#[derive(Clone)]
pub struct CallbackClient {
    http: reqwest::Client,
}

impl CallbackClient {
    pub fn new(timeout_secs: u64) -> WorkerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| WorkerError::CallbackDelivery(e.to_string()))?;
        Ok(Self { http })
    }

    /// Deliver a terminal callback, retrying transient failures.
    ///
    /// A 5xx answer is retried too: the controller returns one when output
    /// promotion fails, and redelivery re-attempts the promotion without
    /// re-running the transcode.
    pub async fn deliver(&self, url: &str, callback: &StatusCallback) -> WorkerResult<()> {
        let config = RetryConfig::new("status_callback");
        retry_async(&config, || self.post_once(url, callback)).await
    }

    /// Best-effort progress update: one shot, failures only logged.
    pub async fn notify_progress(&self, url: &str, callback: &StatusCallback) {
        if let Err(e) = self.post_once(url, callback).await {
            debug!("Progress callback dropped: {e}");
        }
    }

    async fn post_once(&self, url: &str, callback: &StatusCallback) -> WorkerResult<()> {
        let response = self
            .http
            .post(url)
            .json(callback)
            .send()
            .await
            .map_err(|e| WorkerError::CallbackDelivery(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        Err(WorkerError::CallbackDelivery(format!(
            "controller answered {status}: {detail}"
        )))
    }

    /// Post a startup/shutdown notice. Best effort.
    pub async fn post_event(&self, url: &str, event: &WorkerEvent) {
        match self.http.post(url).json(event).send().await {
            Ok(response) if response.status() == StatusCode::OK => {}
            Ok(response) => warn!("Worker event rejected: {}", response.status()),
            Err(e) => warn!("Worker event not delivered: {e}"),
        }
    }
}
