//! Remux worker runtime.
//!
//! This crate provides:
//! - The HTTP accept endpoint guarded by the single job slot
//! - The conversion pipeline (analyze, select title, remux, report)
//! - Callback delivery with retry
//! - Status, cancellation and cleanup endpoints

pub mod callback;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod processor;
pub mod retry;
pub mod routes;
pub mod slot;
pub mod state;

pub use callback::CallbackClient;
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::TaskLogger;
pub use processor::Processor;
pub use slot::{JobSlot, SlotLease};
pub use state::AppState;
