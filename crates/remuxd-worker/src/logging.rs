//! Structured per-task logging.

use remuxd_models::TaskId;
use tracing::{error, info, warn};

/// Task logger with consistent contextual fields.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    task_id: String,
    operation: String,
}

impl TaskLogger {
    pub fn new(task_id: &TaskId, operation: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn start(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            operation = %self.operation,
            "Task started: {}", message
        );
    }

    pub fn progress(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            operation = %self.operation,
            "Task progress: {}", message
        );
    }

    pub fn warning(&self, message: &str) {
        warn!(
            task_id = %self.task_id,
            operation = %self.operation,
            "Task warning: {}", message
        );
    }

    pub fn failure(&self, message: &str) {
        error!(
            task_id = %self.task_id,
            operation = %self.operation,
            "Task failed: {}", message
        );
    }

    pub fn completion(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            operation = %self.operation,
            "Task completed: {}", message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_carries_task_id() {
        let task_id = TaskId::from_string("t-log");
        let logger = TaskLogger::new(&task_id, "remux");
        assert_eq!(logger.task_id, "t-log");
        assert_eq!(logger.operation, "remux");
    }
}
