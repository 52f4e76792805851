//! Aggregate conversion statistics.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Counts and totals computed over the task store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TaskStatistics {
    pub total_tasks: u64,
    pub pending_tasks: u64,
    pub sent_tasks: u64,
    pub processing_tasks: u64,
    pub retrying_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    /// Percentage of terminal tasks that completed
    pub success_rate: f64,
    /// Sum of promoted output sizes in bytes
    pub total_output_bytes: u64,
    /// Mean processing time of completed tasks in seconds
    pub average_processing_seconds: f64,
}

impl TaskStatistics {
    /// Recompute the success rate from the completed/failed counts.
    pub fn finalize(mut self) -> Self {
        let terminal = self.completed_tasks + self.failed_tasks;
        self.success_rate = if terminal > 0 {
            (self.completed_tasks as f64 / terminal as f64) * 100.0
        } else {
            0.0
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        let stats = TaskStatistics {
            completed_tasks: 3,
            failed_tasks: 1,
            ..Default::default()
        }
        .finalize();
        assert!((stats.success_rate - 75.0).abs() < f64::EPSILON);

        let empty = TaskStatistics::default().finalize();
        assert_eq!(empty.success_rate, 0.0);
    }
}
