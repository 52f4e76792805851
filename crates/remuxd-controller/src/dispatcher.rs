//! Task dispatch loop.
//!
//! Claims the next eligible task and hands it to the worker. The accept
//! call is short; the dispatcher never waits for the transcode itself.
//! Completion arrives later through the webhook.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use remuxd_models::{ProcessRequest, ProcessingAttemptRecord, AttemptOutcome, Task};
use remuxd_store::{StoreResult, TaskStore};

use crate::config::ControllerConfig;
use crate::metrics;
use crate::notifier::Notifier;
use crate::worker_client::WorkerApi;

/// How one dispatch round ended; used for logging and tests.
#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No pending task was eligible
    Idle,
    /// The worker accepted the task
    Accepted,
    /// All send attempts failed; the task went through `request_retry`
    SendExhausted,
}

/// Controller-side dispatcher.
pub struct Dispatcher {
    config: ControllerConfig,
    tasks: TaskStore,
    worker: Arc<dyn WorkerApi>,
    notifier: Notifier,
}

impl Dispatcher {
    pub fn new(
        config: ControllerConfig,
        tasks: TaskStore,
        worker: Arc<dyn WorkerApi>,
        notifier: Notifier,
    ) -> Self {
        Self {
            config,
            tasks,
            worker,
            notifier,
        }
    }

    /// Run the dispatch loop until the process exits.
    pub async fn run(self) {
        info!(
            interval_secs = self.config.dispatch_interval.as_secs(),
            "Dispatcher started"
        );
        let mut ticker = tokio::time::interval(self.config.dispatch_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                error!("Dispatch cycle error: {e}");
            }
        }
    }

    /// One dispatch cycle: release due retries, claim, send.
    pub async fn tick(&self) -> StoreResult<DispatchOutcome> {
        let released = self.tasks.release_due_retries(Utc::now()).await?;
        if released > 0 {
            metrics::record_task_retried();
        }

        let stats = self.tasks.statistics().await?;
        metrics::set_pending_tasks(stats.pending_tasks);

        let Some(task) = self.tasks.claim_next().await? else {
            return Ok(DispatchOutcome::Idle);
        };

        self.dispatch(task).await
    }

    /// Send one claimed task, retrying transient faults on the fixed
    /// interval. Exhaustion counts as a single failed attempt against the
    /// overall cap.
    async fn dispatch(&self, task: Task) -> StoreResult<DispatchOutcome> {
        let request = ProcessRequest {
            task_id: task.id.clone(),
            source_name: task.source_name.clone(),
            source_path: task.source_path.display().to_string(),
            dispatch_generation: task.dispatch_generation,
            callback_url: self.config.callback_url.clone(),
        };

        let mut last_error = String::new();
        for attempt in 1..=self.config.send_retry_attempts {
            match self.worker.send_task(&request).await {
                Ok(accepted) => {
                    info!(
                        task_id = %task.id,
                        worker_id = %accepted.worker_id,
                        generation = task.dispatch_generation,
                        "Task accepted by worker"
                    );
                    self.tasks
                        .record_worker(&task.id, &accepted.worker_id)
                        .await?;
                    metrics::record_task_dispatched();
                    return Ok(DispatchOutcome::Accepted);
                }
                Err(e) => {
                    // busy should not occur under correct claim logic, but a
                    // restart race can produce it; both faults get the same
                    // fixed-interval retry
                    last_error = e.to_string();
                    warn!(
                        task_id = %task.id,
                        attempt,
                        max = self.config.send_retry_attempts,
                        "Dispatch failed: {last_error}"
                    );
                    if attempt < self.config.send_retry_attempts {
                        tokio::time::sleep(self.config.send_retry_interval).await;
                    }
                }
            }
        }

        let record = ProcessingAttemptRecord::new(
            task.id.clone(),
            task.dispatch_generation,
            AttemptOutcome::DispatchFailed,
        )
        .with_error(&last_error);
        self.tasks.record_attempt(&record).await?;

        let updated = self
            .tasks
            .request_retry(
                &task.id,
                format!("worker unreachable: {last_error}"),
                self.config.max_attempts,
                chrono::Duration::from_std(self.config.retry_backoff)
                    .unwrap_or_else(|_| chrono::Duration::seconds(1800)),
            )
            .await?;

        if updated.status == remuxd_models::TaskStatus::Failed {
            metrics::record_task_failed("dispatch");
            self.notifier.notify(format!(
                "Failed: {} (worker unreachable after {} attempts)",
                task.source_name, updated.attempts
            ));
        }

        Ok(DispatchOutcome::SendExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use remuxd_models::{ProcessAccepted, TaskId, TaskStatus, WorkerStatus};
    use remuxd_store::MemoryStore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use crate::worker_client::DispatchError;

    /// Worker stub with a scripted accept behavior.
    struct StubWorker {
        accept: bool,
        calls: AtomicU32,
    }

    impl StubWorker {
        fn unreachable() -> Self {
            Self {
                accept: false,
                calls: AtomicU32::new(0),
            }
        }

        fn accepting() -> Self {
            Self {
                accept: true,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl WorkerApi for StubWorker {
        async fn send_task(
            &self,
            request: &ProcessRequest,
        ) -> Result<ProcessAccepted, DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.accept {
                Ok(ProcessAccepted {
                    accepted: true,
                    message: "ok".into(),
                    task_id: request.task_id.clone(),
                    worker_id: "stub".into(),
                })
            } else {
                Err(DispatchError::Unreachable("connection refused".into()))
            }
        }

        async fn status(&self) -> Result<WorkerStatus, DispatchError> {
            Ok(WorkerStatus::idle())
        }

        async fn cancel(&self, _task_id: &TaskId) -> Result<bool, DispatchError> {
            Ok(false)
        }

        async fn health(&self) -> bool {
            self.accept
        }
    }

    fn fast_config() -> ControllerConfig {
        ControllerConfig {
            send_retry_interval: Duration::from_millis(10),
            // the backoff deadline is wall-clock while the tests run on
            // paused virtual time, so it must elapse immediately
            retry_backoff: Duration::from_millis(0),
            ..ControllerConfig::default()
        }
    }

    fn dispatcher_with(worker: Arc<StubWorker>, config: ControllerConfig) -> Dispatcher {
        Dispatcher::new(
            config,
            TaskStore::new(MemoryStore::shared()),
            worker,
            Notifier::disabled(),
        )
    }

    #[tokio::test]
    async fn test_idle_when_nothing_pending() {
        let dispatcher = dispatcher_with(Arc::new(StubWorker::accepting()), fast_config());
        assert_eq!(dispatcher.tick().await.unwrap(), DispatchOutcome::Idle);
    }

    #[tokio::test]
    async fn test_accepted_task_stays_sent() {
        let worker = Arc::new(StubWorker::accepting());
        let dispatcher = dispatcher_with(worker.clone(), fast_config());
        let task = dispatcher
            .tasks
            .create_task("Movie", "/raw/Movie", 10, 0)
            .await
            .unwrap();

        assert_eq!(dispatcher.tick().await.unwrap(), DispatchOutcome::Accepted);
        assert_eq!(worker.calls.load(Ordering::SeqCst), 1);

        let sent = dispatcher.tasks.get_task(&task.id).await.unwrap();
        assert_eq!(sent.status, TaskStatus::Sent);
        assert_eq!(sent.dispatch_generation, 1);
        assert_eq!(sent.attempts, 0);
        assert_eq!(sent.worker_id.as_deref(), Some("stub"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_worker_retried_exactly_three_times() {
        let worker = Arc::new(StubWorker::unreachable());
        let dispatcher = dispatcher_with(worker.clone(), fast_config());
        let task = dispatcher
            .tasks
            .create_task("Movie", "/raw/Movie", 10, 0)
            .await
            .unwrap();

        assert_eq!(
            dispatcher.tick().await.unwrap(),
            DispatchOutcome::SendExhausted
        );
        // exactly 3 sends on the fixed interval, then give up
        assert_eq!(worker.calls.load(Ordering::SeqCst), 3);

        let after = dispatcher.tasks.get_task(&task.id).await.unwrap();
        assert_eq!(after.status, TaskStatus::Retrying);
        assert_eq!(after.attempts, 1, "exhaustion is one attempt, not three");

        let attempts = dispatcher.tasks.list_attempts(&task.id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].outcome, AttemptOutcome::DispatchFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_fails_only_after_overall_cap() {
        let worker = Arc::new(StubWorker::unreachable());
        let dispatcher = dispatcher_with(worker.clone(), fast_config());
        let task = dispatcher
            .tasks
            .create_task("Movie", "/raw/Movie", 10, 0)
            .await
            .unwrap();

        // each cycle: claim, 3 failed sends, one attempt consumed
        for expected_attempts in 1..=dispatcher.config.max_attempts {
            // let the backoff elapse so the task is claimable again
            tokio::time::sleep(Duration::from_millis(20)).await;
            let outcome = dispatcher.tick().await.unwrap();
            assert_eq!(outcome, DispatchOutcome::SendExhausted);

            let current = dispatcher.tasks.get_task(&task.id).await.unwrap();
            assert_eq!(current.attempts, expected_attempts);
            if expected_attempts < dispatcher.config.max_attempts {
                assert_eq!(current.status, TaskStatus::Retrying, "not failed early");
            } else {
                assert_eq!(current.status, TaskStatus::Failed);
            }
        }

        assert_eq!(worker.calls.load(Ordering::SeqCst), 9);
        let final_task = dispatcher.tasks.get_task(&task.id).await.unwrap();
        assert!(final_task.attempts <= dispatcher.config.max_attempts);
    }
}
