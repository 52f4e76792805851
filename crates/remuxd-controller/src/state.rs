//! Application state.

use std::sync::Arc;

use tracing::{info, warn};

use remuxd_store::{MemoryStore, RecordStore, RedisStore, TaskStore};

use crate::config::ControllerConfig;
use crate::error::ApiError;
use crate::notifier::Notifier;
use crate::reconciler::Reconciler;
use crate::scanner::Scanner;
use crate::worker_client::{HttpWorkerClient, WorkerApi};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ControllerConfig,
    pub tasks: TaskStore,
    pub worker: Arc<dyn WorkerApi>,
    pub notifier: Notifier,
    pub scanner: Arc<Scanner>,
    pub reconciler: Arc<Reconciler>,
    /// Guards against overlapping scans
    pub scan_lock: Arc<tokio::sync::Mutex<()>>,
}

impl AppState {
    /// Create application state from the environment.
    ///
    /// `REDIS_URL` selects the durable record store; without it the state
    /// falls back to the in-memory store (single-node, non-durable).
    pub fn new(config: ControllerConfig) -> Result<Self, ApiError> {
        let store: Arc<dyn RecordStore> = if std::env::var("REDIS_URL").is_ok() {
            info!("Using Redis record store");
            Arc::new(RedisStore::from_env()?)
        } else {
            warn!("REDIS_URL not set; using the non-durable in-memory store");
            MemoryStore::shared()
        };

        let worker: Arc<dyn WorkerApi> = Arc::new(
            HttpWorkerClient::new(&config.worker_url, config.accept_timeout)
                .map_err(|e| ApiError::internal(e.to_string()))?,
        );

        Ok(Self::with_parts(config, TaskStore::new(store), worker, Notifier::from_env()))
    }

    /// Assemble state from explicit parts (used by tests and by `new`).
    pub fn with_parts(
        config: ControllerConfig,
        tasks: TaskStore,
        worker: Arc<dyn WorkerApi>,
        notifier: Notifier,
    ) -> Self {
        let scanner = Arc::new(Scanner::new(
            config.clone(),
            tasks.clone(),
            notifier.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            config.clone(),
            tasks.clone(),
            notifier.clone(),
        ));

        Self {
            config,
            tasks,
            worker,
            notifier,
            scanner,
            reconciler,
            scan_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}
