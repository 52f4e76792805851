//! Task lifecycle operations on top of the record store.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use remuxd_models::{
    ProcessingAttemptRecord, Task, TaskId, TaskStatistics, TaskStatus,
};

use crate::error::{StoreError, StoreResult};
use crate::record::RecordStore;

const TASK_PREFIX: &str = "task:";
const ATTEMPT_PREFIX: &str = "attempt:";

/// Rounds of compare-and-set retry before giving up on a contended record.
const CAS_ROUNDS: u32 = 16;

/// Filter for task listings.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
}

impl TaskFilter {
    pub fn with_status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
        }
    }

    fn matches(&self, task: &Task) -> bool {
        self.status.map(|s| task.status == s).unwrap_or(true)
    }
}

/// Durable record of every unit of work and its lifecycle state.
///
/// All mutations are single-record compare-and-set updates; `claim_next` is
/// the only path from pending to sent and therefore the only way a task can
/// reach the worker.
#[derive(Clone)]
pub struct TaskStore {
    store: Arc<dyn RecordStore>,
}

impl TaskStore {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    fn task_key(id: &TaskId) -> String {
        format!("{TASK_PREFIX}{id}")
    }

    fn attempt_key(task_id: &TaskId, generation: u64) -> String {
        format!("{ATTEMPT_PREFIX}{task_id}:{generation}")
    }

    async fn load(&self, id: &TaskId) -> StoreResult<Option<(Task, u64)>> {
        match self.store.get(&Self::task_key(id)).await? {
            Some(record) => {
                let task: Task = serde_json::from_str(&record.payload)?;
                Ok(Some((task, record.version)))
            }
            None => Ok(None),
        }
    }

    async fn load_all(&self) -> StoreResult<Vec<(Task, u64)>> {
        let keys = self.store.keys(TASK_PREFIX).await?;
        let mut tasks = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = self.store.get(&key).await? {
                let task: Task = serde_json::from_str(&record.payload)?;
                tasks.push((task, record.version));
            }
        }
        Ok(tasks)
    }

    /// Apply `mutate` to the task under a compare-and-set loop.
    async fn update<F>(&self, id: &TaskId, mutate: F) -> StoreResult<Task>
    where
        F: Fn(&mut Task) -> StoreResult<()>,
    {
        for _ in 0..CAS_ROUNDS {
            let (mut task, version) = self
                .load(id)
                .await?
                .ok_or_else(|| StoreError::TaskNotFound(id.to_string()))?;

            mutate(&mut task)?;

            let payload = serde_json::to_string(&task)?;
            if self
                .store
                .put(&Self::task_key(id), Some(version), payload)
                .await?
            {
                return Ok(task);
            }
        }

        Err(StoreError::ClaimContention(CAS_ROUNDS))
    }

    /// Create a task for a source directory.
    ///
    /// Fails with [`StoreError::DuplicateTask`] while an active task already
    /// references the same source path.
    pub async fn create_task(
        &self,
        source_name: impl Into<String>,
        source_path: impl Into<std::path::PathBuf>,
        source_size: u64,
        priority: i32,
    ) -> StoreResult<Task> {
        let source_path = source_path.into();

        if let Some(existing) = self.find_active_by_path(&source_path).await? {
            return Err(StoreError::DuplicateTask(
                existing.source_path.display().to_string(),
            ));
        }

        let task = Task::new(source_name, source_path, source_size, priority);
        let payload = serde_json::to_string(&task)?;
        if !self.store.put(&Self::task_key(&task.id), None, payload).await? {
            // id collision is effectively impossible; treat as backend fault
            return Err(StoreError::backend(format!(
                "task record already exists: {}",
                task.id
            )));
        }

        info!(task_id = %task.id, source = %task.source_name, "Created task");
        Ok(task)
    }

    /// Active (non-terminal) task referencing the given source path, if any.
    pub async fn find_active_by_path(
        &self,
        path: &std::path::Path,
    ) -> StoreResult<Option<Task>> {
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .map(|(task, _)| task)
            .find(|task| task.status.is_active() && task.source_path == path))
    }

    /// Atomically claim the best pending task: highest priority first, then
    /// oldest, then largest source. Transitions it to sent and bumps the
    /// dispatch generation.
    ///
    /// Concurrent callers race on the record's compare-and-set; the loser
    /// re-scans, so a task is handed out exactly once per claim.
    pub async fn claim_next(&self) -> StoreResult<Option<Task>> {
        for _ in 0..CAS_ROUNDS {
            let mut pending: Vec<(Task, u64)> = self
                .load_all()
                .await?
                .into_iter()
                .filter(|(task, _)| task.status == TaskStatus::Pending)
                .collect();

            pending.sort_by(|(a, _), (b, _)| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(b.source_size.cmp(&a.source_size))
                    .then(a.id.as_str().cmp(b.id.as_str()))
            });

            let Some((mut task, version)) = pending.into_iter().next() else {
                return Ok(None);
            };

            let generation = task.claim()?;
            let payload = serde_json::to_string(&task)?;
            if self
                .store
                .put(&Self::task_key(&task.id), Some(version), payload)
                .await?
            {
                info!(
                    task_id = %task.id,
                    generation,
                    priority = task.priority,
                    "Claimed task"
                );
                return Ok(Some(task));
            }

            debug!(task_id = %task.id, "Lost claim race, rescanning");
        }

        Err(StoreError::ClaimContention(CAS_ROUNDS))
    }

    /// Move retrying tasks whose backoff elapsed back to pending.
    pub async fn release_due_retries(&self, now: DateTime<Utc>) -> StoreResult<u32> {
        let mut released = 0u32;
        for (task, _) in self.load_all().await? {
            if task.status != TaskStatus::Retrying {
                continue;
            }
            let due = task.next_retry_at.map(|at| at <= now).unwrap_or(true);
            if !due {
                continue;
            }
            match self
                .update(&task.id, |t| {
                    t.transition(TaskStatus::Pending)?;
                    Ok(())
                })
                .await
            {
                Ok(_) => {
                    info!(task_id = %task.id, "Retry backoff elapsed, task pending again");
                    released += 1;
                }
                Err(StoreError::IllegalTransition(e)) => {
                    // raced with another mutation; nothing to release anymore
                    debug!(task_id = %task.id, "Skipping retry release: {e}");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(released)
    }

    /// Worker acknowledged the job: sent -> processing. Idempotent for a
    /// task that is already processing.
    pub async fn mark_processing(
        &self,
        id: &TaskId,
        worker_id: Option<&str>,
    ) -> StoreResult<Task> {
        self.update(id, |task| {
            if task.status != TaskStatus::Processing {
                task.transition(TaskStatus::Processing)?;
            }
            if let Some(worker) = worker_id {
                task.worker_id = Some(worker.to_string());
            }
            Ok(())
        })
        .await
    }

    /// Success: processing -> completed with the promoted output recorded.
    pub async fn mark_completed(
        &self,
        id: &TaskId,
        output_path: impl Into<std::path::PathBuf>,
        output_size: u64,
        processing_time_seconds: f64,
    ) -> StoreResult<Task> {
        let output_path = output_path.into();
        self.update(id, |task| {
            task.transition(TaskStatus::Completed)?;
            task.output_path = Some(output_path.clone());
            task.output_size = Some(output_size);
            task.processing_time_seconds = Some(processing_time_seconds);
            task.error_message = None;
            Ok(())
        })
        .await
    }

    /// Permanent, non-retryable failure (e.g. no usable primary title).
    ///
    /// Walks processing/sent -> retrying -> failed so the lifecycle graph is
    /// honored, and counts the attempt.
    pub async fn mark_failed(&self, id: &TaskId, error: impl Into<String>) -> StoreResult<Task> {
        let error = error.into();
        self.update(id, |task| {
            if task.status != TaskStatus::Retrying {
                task.transition(TaskStatus::Retrying)?;
            }
            task.attempts += 1;
            task.transition(TaskStatus::Failed)?;
            task.error_message = Some(error.clone());
            Ok(())
        })
        .await
    }

    /// Retryable failure: count the attempt and either schedule the next
    /// retry or, at the cap, fail permanently.
    pub async fn request_retry(
        &self,
        id: &TaskId,
        error: impl Into<String>,
        attempt_cap: u32,
        backoff: Duration,
    ) -> StoreResult<Task> {
        let error = error.into();
        self.update(id, |task| {
            if task.status != TaskStatus::Retrying {
                task.transition(TaskStatus::Retrying)?;
            }
            task.attempts += 1;
            task.error_message = Some(error.clone());
            if task.attempts >= attempt_cap {
                task.transition(TaskStatus::Failed)?;
            } else {
                task.next_retry_at = Some(Utc::now() + backoff);
            }
            Ok(())
        })
        .await
    }

    /// Record a dispatch attempt. Append-only and idempotent: a second write
    /// for the same `(task, generation)` is ignored.
    pub async fn record_attempt(&self, record: &ProcessingAttemptRecord) -> StoreResult<bool> {
        let key = Self::attempt_key(&record.task_id, record.generation);
        let payload = serde_json::to_string(record)?;
        let written = self.store.put(&key, None, payload).await?;
        if !written {
            debug!(
                task_id = %record.task_id,
                generation = record.generation,
                "Attempt already recorded"
            );
        }
        Ok(written)
    }

    /// All attempt records for a task, oldest first.
    pub async fn list_attempts(&self, id: &TaskId) -> StoreResult<Vec<ProcessingAttemptRecord>> {
        let keys = self.store.keys(&format!("{ATTEMPT_PREFIX}{id}:")).await?;
        let mut attempts = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = self.store.get(&key).await? {
                attempts.push(serde_json::from_str::<ProcessingAttemptRecord>(&record.payload)?);
            }
        }
        attempts.sort_by_key(|a| a.generation);
        Ok(attempts)
    }

    pub async fn get_task(&self, id: &TaskId) -> StoreResult<Task> {
        self.load(id)
            .await?
            .map(|(task, _)| task)
            .ok_or_else(|| StoreError::TaskNotFound(id.to_string()))
    }

    /// Tasks for display: priority first, newest first within a priority.
    pub async fn list_tasks(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .load_all()
            .await?
            .into_iter()
            .map(|(task, _)| task)
            .filter(|task| filter.matches(task))
            .collect();

        tasks.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(tasks)
    }

    /// Record which worker accepted the dispatch, without a transition.
    pub async fn record_worker(&self, id: &TaskId, worker_id: &str) -> StoreResult<Task> {
        let worker_id = worker_id.to_string();
        self.update(id, |task| {
            task.worker_id = Some(worker_id.clone());
            Ok(())
        })
        .await
    }

    /// Record an error on the task without a lifecycle transition.
    ///
    /// Used when output promotion fails: the task stays in processing while
    /// the worker's callback redelivery retries the promotion, but the
    /// operator should see what is going on.
    pub async fn annotate_error(&self, id: &TaskId, error: impl Into<String>) -> StoreResult<Task> {
        let error = error.into();
        self.update(id, |task| {
            task.error_message = Some(error.clone());
            task.updated_at = Utc::now();
            Ok(())
        })
        .await
    }

    pub async fn set_priority(&self, id: &TaskId, priority: i32) -> StoreResult<Task> {
        self.update(id, |task| {
            task.priority = priority;
            task.updated_at = Utc::now();
            Ok(())
        })
        .await
    }

    /// Operator restart: terminal -> pending with attempts reset.
    pub async fn restart_task(&self, id: &TaskId) -> StoreResult<Task> {
        let task = self
            .update(id, |task| {
                task.restart()?;
                Ok(())
            })
            .await?;
        info!(task_id = %id, "Task restarted");
        Ok(task)
    }

    /// Delete a task and its attempt history. Refused while processing.
    pub async fn delete_task(&self, id: &TaskId) -> StoreResult<()> {
        let (task, _) = self
            .load(id)
            .await?
            .ok_or_else(|| StoreError::TaskNotFound(id.to_string()))?;

        if task.status == TaskStatus::Processing {
            return Err(StoreError::TaskBusy(id.to_string()));
        }

        for key in self.store.keys(&format!("{ATTEMPT_PREFIX}{id}:")).await? {
            self.store.delete(&key).await?;
        }
        self.store.delete(&Self::task_key(id)).await?;
        info!(task_id = %id, "Task deleted");
        Ok(())
    }

    /// Delete terminal tasks (and their attempt history) whose last update is
    /// older than the retention window. Never touches non-terminal work.
    pub async fn purge_older_than(&self, days: i64) -> StoreResult<u32> {
        let cutoff = Utc::now() - Duration::days(days);
        let mut purged = 0u32;

        for (task, _) in self.load_all().await? {
            if task.status.is_terminal() && task.updated_at < cutoff {
                self.delete_task(&task.id).await?;
                purged += 1;
            }
        }

        if purged > 0 {
            info!(purged, days, "Purged old terminal tasks");
        }
        Ok(purged)
    }

    /// Aggregate statistics over the whole store.
    pub async fn statistics(&self) -> StoreResult<TaskStatistics> {
        let mut stats = TaskStatistics::default();
        let mut processing_time_sum = 0.0;

        for (task, _) in self.load_all().await? {
            stats.total_tasks += 1;
            match task.status {
                TaskStatus::Pending => stats.pending_tasks += 1,
                TaskStatus::Sent => stats.sent_tasks += 1,
                TaskStatus::Processing => stats.processing_tasks += 1,
                TaskStatus::Retrying => stats.retrying_tasks += 1,
                TaskStatus::Completed => {
                    stats.completed_tasks += 1;
                    stats.total_output_bytes += task.output_size.unwrap_or(0);
                    processing_time_sum += task.processing_time_seconds.unwrap_or(0.0);
                }
                TaskStatus::Failed => stats.failed_tasks += 1,
            }
        }

        if stats.completed_tasks > 0 {
            stats.average_processing_seconds = processing_time_sum / stats.completed_tasks as f64;
        }
        Ok(stats.finalize())
    }

    /// Recovery hook for a worker shutdown notice: any task stuck in sent or
    /// processing goes back to pending (via retrying, attempts untouched).
    pub async fn reset_inflight_to_pending(&self) -> StoreResult<u32> {
        let mut reset = 0u32;
        for (task, _) in self.load_all().await? {
            if !matches!(task.status, TaskStatus::Sent | TaskStatus::Processing) {
                continue;
            }
            match self
                .update(&task.id, |t| {
                    if t.status != TaskStatus::Retrying {
                        t.transition(TaskStatus::Retrying)?;
                    }
                    t.transition(TaskStatus::Pending)?;
                    Ok(())
                })
                .await
            {
                Ok(_) => {
                    warn!(task_id = %task.id, "In-flight task reset to pending");
                    reset += 1;
                }
                Err(StoreError::IllegalTransition(e)) => {
                    debug!(task_id = %task.id, "Skipping in-flight reset: {e}");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(reset)
    }

    /// Backend connectivity probe.
    pub async fn ping(&self) -> StoreResult<()> {
        self.store.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MemoryStore;
    use remuxd_models::AttemptOutcome;

    fn store() -> TaskStore {
        TaskStore::new(MemoryStore::shared())
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_active_source() {
        let tasks = store();
        tasks
            .create_task("Movie", "/raw/Movie", 1000, 0)
            .await
            .unwrap();

        let err = tasks
            .create_task("Movie", "/raw/Movie", 1000, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateTask(_)));
    }

    #[tokio::test]
    async fn test_create_allowed_after_terminal() {
        let tasks = store();
        let task = tasks
            .create_task("Movie", "/raw/Movie", 1000, 0)
            .await
            .unwrap();

        tasks.claim_next().await.unwrap().unwrap();
        tasks.mark_processing(&task.id, None).await.unwrap();
        tasks
            .mark_completed(&task.id, "/processed/Movie.mkv", 42, 10.0)
            .await
            .unwrap();

        // terminal task no longer blocks the source path
        tasks
            .create_task("Movie", "/raw/Movie", 1000, 0)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_claim_order_priority_then_age() {
        let tasks = store();
        let old_low = tasks.create_task("A", "/raw/A", 10, 0).await.unwrap();
        let new_high = tasks.create_task("B", "/raw/B", 10, 5).await.unwrap();
        let _newer_low = tasks.create_task("C", "/raw/C", 10, 0).await.unwrap();

        let first = tasks.claim_next().await.unwrap().unwrap();
        assert_eq!(first.id, new_high.id, "priority beats creation order");
        assert_eq!(first.status, TaskStatus::Sent);
        assert_eq!(first.dispatch_generation, 1);

        let second = tasks.claim_next().await.unwrap().unwrap();
        assert_eq!(second.id, old_low.id, "oldest wins within a priority");
    }

    #[tokio::test]
    async fn test_priority_override_reorders_claims() {
        let tasks = store();
        let _first = tasks.create_task("A", "/raw/A", 10, 0).await.unwrap();
        let boosted = tasks.create_task("B", "/raw/B", 10, 0).await.unwrap();

        tasks.set_priority(&boosted.id, 9).await.unwrap();

        let claimed = tasks.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id, boosted.id);
    }

    #[tokio::test]
    async fn test_size_breaks_ties() {
        let tasks = store();
        // same priority; force identical creation instants by rewriting
        let small = tasks.create_task("S", "/raw/S", 10, 0).await.unwrap();
        let large = tasks.create_task("L", "/raw/L", 10_000, 0).await.unwrap();

        let created = small.created_at;
        tasks
            .update(&large.id, |t| {
                t.created_at = created;
                Ok(())
            })
            .await
            .unwrap();

        let claimed = tasks.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id, large.id);
    }

    #[tokio::test]
    async fn test_concurrent_claims_hand_out_each_task_once() {
        let tasks = store();
        for i in 0..3 {
            tasks
                .create_task(format!("M{i}"), format!("/raw/M{i}"), 10, 0)
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let tasks = tasks.clone();
            handles.push(tokio::spawn(async move { tasks.claim_next().await }));
        }

        let mut claimed_ids = Vec::new();
        for handle in handles {
            if let Some(task) = handle.await.unwrap().unwrap() {
                claimed_ids.push(task.id);
            }
        }

        // 3 tasks exist, 8 claimers: exactly 3 claims succeed, no double hand-out
        assert_eq!(claimed_ids.len(), 3);
        claimed_ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        claimed_ids.dedup();
        assert_eq!(claimed_ids.len(), 3);
    }

    #[tokio::test]
    async fn test_single_processing_slot_observable() {
        let tasks = store();
        let a = tasks.create_task("A", "/raw/A", 10, 0).await.unwrap();
        tasks.create_task("B", "/raw/B", 10, 0).await.unwrap();

        tasks.claim_next().await.unwrap().unwrap();
        tasks.mark_processing(&a.id, Some("worker-1")).await.unwrap();

        let stats = tasks.statistics().await.unwrap();
        assert_eq!(stats.processing_tasks, 1);
        assert!(stats.processing_tasks <= 1);
    }

    #[tokio::test]
    async fn test_request_retry_respects_cap() {
        let tasks = store();
        let task = tasks.create_task("M", "/raw/M", 10, 0).await.unwrap();

        // attempt 1: retry scheduled
        tasks.claim_next().await.unwrap().unwrap();
        let after_first = tasks
            .request_retry(&task.id, "ffmpeg crashed", 2, Duration::minutes(30))
            .await
            .unwrap();
        assert_eq!(after_first.status, TaskStatus::Retrying);
        assert_eq!(after_first.attempts, 1);
        assert!(after_first.next_retry_at.is_some());

        // backoff elapses, task is claimable again
        tasks
            .update(&task.id, |t| {
                t.next_retry_at = Some(Utc::now() - Duration::seconds(1));
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(tasks.release_due_retries(Utc::now()).await.unwrap(), 1);

        // attempt 2 hits the cap: permanent failure
        tasks.claim_next().await.unwrap().unwrap();
        let after_second = tasks
            .request_retry(&task.id, "ffmpeg crashed again", 2, Duration::minutes(30))
            .await
            .unwrap();
        assert_eq!(after_second.status, TaskStatus::Failed);
        assert_eq!(after_second.attempts, 2);
        assert!(after_second.attempts <= 2, "attempts never exceed the cap");
    }

    #[tokio::test]
    async fn test_mark_failed_is_permanent() {
        let tasks = store();
        let task = tasks.create_task("M", "/raw/M", 10, 0).await.unwrap();
        tasks.claim_next().await.unwrap().unwrap();
        tasks.mark_processing(&task.id, None).await.unwrap();

        let failed = tasks
            .mark_failed(&task.id, "no title above the duration floor")
            .await
            .unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.attempts, 1);
        assert!(failed.error_message.is_some());
    }

    #[tokio::test]
    async fn test_illegal_transition_surfaces_protocol_error() {
        let tasks = store();
        let task = tasks.create_task("M", "/raw/M", 10, 0).await.unwrap();

        // completing a pending task skips the whole graph
        let err = tasks
            .mark_completed(&task.id, "/out.mkv", 1, 1.0)
            .await
            .unwrap_err();
        assert!(err.is_protocol_error());

        // and leaves the record untouched
        let unchanged = tasks.get_task(&task.id).await.unwrap();
        assert_eq!(unchanged.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_attempt_records_append_once() {
        let tasks = store();
        let task = tasks.create_task("M", "/raw/M", 10, 0).await.unwrap();

        let record = ProcessingAttemptRecord::new(task.id.clone(), 1, AttemptOutcome::Failed)
            .with_error("boom");
        assert!(tasks.record_attempt(&record).await.unwrap());
        // duplicate delivery of the same attempt is ignored
        assert!(!tasks.record_attempt(&record).await.unwrap());

        let attempts = tasks.list_attempts(&task.id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].outcome, AttemptOutcome::Failed);
    }

    #[tokio::test]
    async fn test_delete_refused_while_processing() {
        let tasks = store();
        let task = tasks.create_task("M", "/raw/M", 10, 0).await.unwrap();
        tasks.claim_next().await.unwrap().unwrap();
        tasks.mark_processing(&task.id, None).await.unwrap();

        let err = tasks.delete_task(&task.id).await.unwrap_err();
        assert!(matches!(err, StoreError::TaskBusy(_)));
    }

    #[tokio::test]
    async fn test_purge_only_touches_old_terminal_tasks() {
        let tasks = store();
        let done = tasks.create_task("Old", "/raw/Old", 10, 0).await.unwrap();
        tasks.claim_next().await.unwrap().unwrap();
        tasks.mark_processing(&done.id, None).await.unwrap();
        tasks
            .mark_completed(&done.id, "/processed/Old.mkv", 1, 1.0)
            .await
            .unwrap();
        // age the record past the retention window
        tasks
            .update(&done.id, |t| {
                t.updated_at = Utc::now() - Duration::days(90);
                Ok(())
            })
            .await
            .unwrap();

        let live = tasks.create_task("Live", "/raw/Live", 10, 0).await.unwrap();

        assert_eq!(tasks.purge_older_than(60).await.unwrap(), 1);
        assert!(matches!(
            tasks.get_task(&done.id).await.unwrap_err(),
            StoreError::TaskNotFound(_)
        ));
        // pending work survives any retention window
        tasks.get_task(&live.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_returns_task_to_pending() {
        let tasks = store();
        let task = tasks.create_task("M", "/raw/M", 10, 0).await.unwrap();
        tasks.claim_next().await.unwrap().unwrap();
        tasks.mark_failed(&task.id, "broken").await.unwrap();

        let restarted = tasks.restart_task(&task.id).await.unwrap();
        assert_eq!(restarted.status, TaskStatus::Pending);
        assert_eq!(restarted.attempts, 0);

        // generation history survives the restart
        assert_eq!(restarted.dispatch_generation, 1);
        let reclaimed = tasks.claim_next().await.unwrap().unwrap();
        assert_eq!(reclaimed.dispatch_generation, 2);
    }

    #[tokio::test]
    async fn test_reset_inflight_on_worker_shutdown() {
        let tasks = store();
        let task = tasks.create_task("M", "/raw/M", 10, 0).await.unwrap();
        tasks.claim_next().await.unwrap().unwrap();
        tasks.mark_processing(&task.id, None).await.unwrap();

        assert_eq!(tasks.reset_inflight_to_pending().await.unwrap(), 1);
        let reset = tasks.get_task(&task.id).await.unwrap();
        assert_eq!(reset.status, TaskStatus::Pending);
        assert_eq!(reset.attempts, 0);
    }

    #[tokio::test]
    async fn test_list_tasks_filter() {
        let tasks = store();
        tasks.create_task("A", "/raw/A", 10, 0).await.unwrap();
        tasks.create_task("B", "/raw/B", 10, 0).await.unwrap();
        tasks.claim_next().await.unwrap().unwrap();

        let pending = tasks
            .list_tasks(&TaskFilter::with_status(TaskStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        let all = tasks.list_tasks(&TaskFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
