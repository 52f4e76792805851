//! Stuck-worker safeguard.
//!
//! If no callback arrives for a long-inflight task, the controller polls the
//! worker's status endpoint. A worker that reports no matching active job
//! has lost the task (crash, restart, dropped callback): the attempt is
//! counted as failed and the task re-enters the retry path. An unreachable
//! worker proves nothing and is left to the next cycle.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use remuxd_models::{AttemptOutcome, ProcessingAttemptRecord, TaskStatus};
use remuxd_store::TaskStore;

use crate::config::ControllerConfig;
use crate::worker_client::WorkerApi;

/// Background detector for tasks the worker no longer knows about.
pub struct StaleTaskDetector {
    config: ControllerConfig,
    tasks: TaskStore,
    worker: Arc<dyn WorkerApi>,
}

impl StaleTaskDetector {
    pub fn new(config: ControllerConfig, tasks: TaskStore, worker: Arc<dyn WorkerApi>) -> Self {
        Self {
            config,
            tasks,
            worker,
        }
    }

    /// Run the detection loop until the process exits.
    pub async fn run(&self) {
        info!(
            interval_secs = self.config.stale_check_interval.as_secs(),
            ceiling_secs = self.config.stale_task_ceiling.as_secs(),
            "Stale task detector started"
        );
        let mut ticker = interval(self.config.stale_check_interval);

        loop {
            ticker.tick().await;
            match self.check_once().await {
                Ok(0) => {}
                Ok(recovered) => info!(recovered, "Stale tasks recovered"),
                Err(e) => error!("Stale task check error: {e}"),
            }
        }
    }

    /// One detection cycle. Returns the number of tasks recovered.
    pub async fn check_once(&self) -> anyhow::Result<u32> {
        let now = Utc::now();
        let ceiling = self.config.stale_task_ceiling.as_secs() as i64;
        let mut recovered = 0u32;

        for task in self
            .tasks
            .list_tasks(&remuxd_store::TaskFilter::default())
            .await?
        {
            if !matches!(task.status, TaskStatus::Sent | TaskStatus::Processing) {
                continue;
            }
            if task.seconds_since_update(now) < ceiling {
                continue;
            }

            // ask the worker before concluding anything
            let status = match self.worker.status().await {
                Ok(status) => status,
                Err(e) => {
                    debug!(task_id = %task.id, "Worker not reachable for stale check: {e}");
                    continue;
                }
            };

            if status.task_id.as_ref() == Some(&task.id) {
                // still running; just a very long conversion
                continue;
            }

            warn!(
                task_id = %task.id,
                silent_secs = task.seconds_since_update(now),
                "Worker reports no matching job; counting a failed attempt"
            );

            let record = ProcessingAttemptRecord::new(
                task.id.clone(),
                task.dispatch_generation,
                AttemptOutcome::Failed,
            )
            .with_error("no callback received and the worker reports no matching job");
            self.tasks.record_attempt(&record).await?;

            self.tasks
                .request_retry(
                    &task.id,
                    "worker lost the job (no callback within the configured ceiling)",
                    self.config.max_attempts,
                    chrono::Duration::from_std(self.config.retry_backoff)
                        .unwrap_or_else(|_| chrono::Duration::seconds(1800)),
                )
                .await?;
            recovered += 1;
        }

        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use remuxd_models::{ProcessAccepted, ProcessRequest, TaskId, WorkerStatus};
    use remuxd_store::MemoryStore;

    use crate::worker_client::DispatchError;

    /// Worker stub with a fixed status answer.
    struct StatusStub {
        active: Option<TaskId>,
        reachable: bool,
    }

    #[async_trait]
    impl WorkerApi for StatusStub {
        async fn send_task(
            &self,
            _request: &ProcessRequest,
        ) -> Result<ProcessAccepted, DispatchError> {
            Err(DispatchError::Busy)
        }

        async fn status(&self) -> Result<WorkerStatus, DispatchError> {
            if !self.reachable {
                return Err(DispatchError::Unreachable("down".into()));
            }
            Ok(match &self.active {
                Some(task_id) => WorkerStatus {
                    task_id: Some(task_id.clone()),
                    is_processing: true,
                    progress_percent: 50.0,
                    status: "converting".into(),
                    source_name: None,
                    elapsed_seconds: 100.0,
                },
                None => WorkerStatus::idle(),
            })
        }

        async fn cancel(&self, _task_id: &TaskId) -> Result<bool, DispatchError> {
            Ok(false)
        }

        async fn health(&self) -> bool {
            self.reachable
        }
    }

    // the detector under test runs with a zero ceiling, so a freshly
    // updated processing task already counts as silent
    async fn silent_processing_task(tasks: &TaskStore) -> remuxd_models::Task {
        let task = tasks.create_task("M", "/raw/M", 10, 0).await.unwrap();
        tasks.claim_next().await.unwrap().unwrap();
        tasks.mark_processing(&task.id, None).await.unwrap()
    }

    fn detector(
        tasks: TaskStore,
        active: Option<TaskId>,
        reachable: bool,
    ) -> StaleTaskDetector {
        StaleTaskDetector::new(
            ControllerConfig {
                stale_task_ceiling: std::time::Duration::from_secs(0),
                ..ControllerConfig::default()
            },
            tasks,
            Arc::new(StatusStub { active, reachable }),
        )
    }

    #[tokio::test]
    async fn test_lost_task_counts_failed_attempt() {
        let tasks = TaskStore::new(MemoryStore::shared());
        let task = silent_processing_task(&tasks).await;

        // worker is idle: it lost the job
        let recovered = detector(tasks.clone(), None, true).check_once().await.unwrap();
        assert_eq!(recovered, 1);

        let after = tasks.get_task(&task.id).await.unwrap();
        assert_eq!(after.status, TaskStatus::Retrying);
        assert_eq!(after.attempts, 1);
        assert_eq!(tasks.list_attempts(&task.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_still_running_task_left_alone() {
        let tasks = TaskStore::new(MemoryStore::shared());
        let task = silent_processing_task(&tasks).await;

        let recovered = detector(tasks.clone(), Some(task.id.clone()), true)
            .check_once()
            .await
            .unwrap();
        assert_eq!(recovered, 0);

        let unchanged = tasks.get_task(&task.id).await.unwrap();
        assert_eq!(unchanged.status, TaskStatus::Processing);
        assert_eq!(unchanged.attempts, 0);
    }

    #[tokio::test]
    async fn test_unreachable_worker_proves_nothing() {
        let tasks = TaskStore::new(MemoryStore::shared());
        let task = silent_processing_task(&tasks).await;

        let recovered = detector(tasks.clone(), None, false).check_once().await.unwrap();
        assert_eq!(recovered, 0);

        let unchanged = tasks.get_task(&task.id).await.unwrap();
        assert_eq!(unchanged.status, TaskStatus::Processing);
    }
}
