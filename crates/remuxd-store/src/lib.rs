//! Durable task store.
//!
//! The store is the single source of truth for the task lifecycle and the
//! sole concurrency-control point of the controller: claiming a task is one
//! atomic compare-and-set against the backing record store, so two callers
//! can never claim the same task.
//!
//! The backing engine is opaque behind [`RecordStore`], a keyed store with
//! per-record versions and compare-and-set writes. [`MemoryStore`] backs
//! tests and single-node setups, [`RedisStore`] is the durable deployment
//! backend.

pub mod error;
pub mod record;
pub mod task_store;

pub use error::{StoreError, StoreResult};
pub use record::{MemoryStore, RecordStore, RedisStore, VersionedRecord};
pub use task_store::{TaskFilter, TaskStore};
