//! Controller node: discovers disc sources, tracks work, dispatches it to
//! the remote worker and reconciles the results.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod notifier;
pub mod reconciler;
pub mod routes;
pub mod scanner;
pub mod stale;
pub mod state;
pub mod worker_client;

pub use config::ControllerConfig;
pub use dispatcher::Dispatcher;
pub use error::{ApiError, ApiResult};
pub use notifier::Notifier;
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use routes::create_router;
pub use scanner::{ScanReport, Scanner};
pub use stale::StaleTaskDetector;
pub use state::AppState;
pub use worker_client::{DispatchError, HttpWorkerClient, WorkerApi};
