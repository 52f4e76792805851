//! Store error types.

use remuxd_models::TransitionError;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("an active task already exists for source: {0}")]
    DuplicateTask(String),

    #[error(transparent)]
    IllegalTransition(#[from] TransitionError),

    #[error("task {0} is processing and cannot be deleted")]
    TaskBusy(String),

    #[error("claim contention not resolved after {0} rounds")]
    ClaimContention(u32),

    #[error("record payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Whether the error is a protocol signal (stale message or bug) rather
    /// than a backend fault.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, StoreError::IllegalTransition(_))
    }
}
