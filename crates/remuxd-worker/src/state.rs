//! Worker application state.

use std::sync::Arc;
use std::time::Instant;

use crate::callback::CallbackClient;
use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::processor::Processor;
use crate::slot::JobSlot;

/// Shared state behind the worker's HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: WorkerConfig,
    pub slot: JobSlot,
    pub processor: Arc<Processor>,
    pub callbacks: CallbackClient,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: WorkerConfig) -> WorkerResult<Self> {
        let slot = JobSlot::new();
        let callbacks = CallbackClient::new(config.callback_timeout_secs)?;
        let processor = Arc::new(Processor::new(
            config.clone(),
            slot.clone(),
            callbacks.clone(),
        ));

        Ok(Self {
            config,
            slot,
            processor,
            callbacks,
            started_at: Instant::now(),
        })
    }
}
