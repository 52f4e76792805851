//! Callback reconciliation.
//!
//! Every worker callback lands here. The reconciler validates the task and
//! the dispatch generation, promotes finished outputs, applies the retry
//! policy for failures, and stays idempotent under duplicate deliveries:
//! network retries can and do deliver the same callback twice.

use tracing::{info, warn};

use remuxd_media::fs_utils::promote_file;
use remuxd_models::{
    AttemptOutcome, FailureKind, ProcessingAttemptRecord, StatusCallback, Task, TaskStatus,
};
use remuxd_store::TaskStore;

use crate::config::ControllerConfig;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::notifier::Notifier;

/// How a callback was handled; surfaced in logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Progress recorded (sent -> processing or a later update)
    ProgressRecorded,
    /// Output promoted, task completed
    Completed,
    /// Failure counted; the task awaits its retry backoff
    RetryScheduled,
    /// Failure counted; the attempt cap is exhausted or the failure is
    /// non-retryable
    FailedPermanently,
    /// Stale or out-of-place callback, discarded without touching state
    Discarded,
    /// The task already reached a terminal state; duplicate delivery
    AlreadyTerminal,
}

/// Controller-side callback handler.
pub struct Reconciler {
    config: ControllerConfig,
    tasks: TaskStore,
    notifier: Notifier,
}

impl Reconciler {
    pub fn new(config: ControllerConfig, tasks: TaskStore, notifier: Notifier) -> Self {
        Self {
            config,
            tasks,
            notifier,
        }
    }

    /// Handle one callback delivery.
    pub async fn handle(&self, callback: StatusCallback) -> ApiResult<ReconcileOutcome> {
        let task_id = callback.task_id().clone();
        let task = self.tasks.get_task(&task_id).await.map_err(|e| {
            warn!(task_id = %task_id, "Callback for unknown task");
            ApiError::from(e)
        })?;

        // duplicate delivery for finished work: acknowledged, nothing happens
        if task.status.is_terminal() {
            info!(
                task_id = %task_id,
                status = %task.status,
                "Duplicate callback for terminal task ignored"
            );
            return Ok(ReconcileOutcome::AlreadyTerminal);
        }

        // a callback from a superseded dispatch must not corrupt the newer
        // attempt's outcome
        if callback.dispatch_generation() != task.dispatch_generation {
            warn!(
                task_id = %task_id,
                callback_generation = callback.dispatch_generation(),
                current_generation = task.dispatch_generation,
                "Stale callback discarded (generation mismatch)"
            );
            return Ok(ReconcileOutcome::Discarded);
        }

        if !matches!(task.status, TaskStatus::Sent | TaskStatus::Processing) {
            warn!(
                task_id = %task_id,
                status = %task.status,
                "Callback for a task that is not in flight, discarded"
            );
            return Ok(ReconcileOutcome::Discarded);
        }

        match callback {
            StatusCallback::Processing {
                progress_percent, ..
            } => {
                self.tasks.mark_processing(&task_id, None).await?;
                if let Some(percent) = progress_percent {
                    info!(task_id = %task_id, percent, "Worker progress");
                }
                Ok(ReconcileOutcome::ProgressRecorded)
            }
            StatusCallback::Completed {
                output_location,
                processing_time_seconds,
                output_size_bytes,
                ..
            } => {
                self.complete(
                    task,
                    &output_location,
                    processing_time_seconds,
                    output_size_bytes,
                )
                .await
            }
            StatusCallback::Failed {
                error,
                failure_kind,
                processing_time_seconds,
                ..
            } => {
                self.fail(task, &error, failure_kind, processing_time_seconds)
                    .await
            }
        }
    }

    /// Success path: promote the staged output, drop the source, complete.
    async fn complete(
        &self,
        task: Task,
        output_location: &str,
        processing_time_seconds: f64,
        output_size_bytes: u64,
    ) -> ApiResult<ReconcileOutcome> {
        // the location is a file name inside the shared staging dir; a path
        // separator smells like a confused or malicious worker
        if output_location.contains('/') || output_location.contains('\\') {
            return Err(ApiError::bad_request(format!(
                "output location must be a bare file name: {output_location}"
            )));
        }

        // the success callback may arrive before any progress callback
        if task.status == TaskStatus::Sent {
            self.tasks.mark_processing(&task.id, None).await?;
        }

        let staged = self.config.staging_path().join(output_location);
        let destination = self
            .config
            .processed_path()
            .join(format!("{}.mkv", task.source_name));

        // promotion must succeed before the source is touched or completion
        // recorded; a failure here is answered 500 so the worker redelivers
        // and promotion is retried without re-running the transcode
        let final_path = match promote_file(&staged, &destination).await {
            Ok(path) => path,
            Err(e) => {
                let message = format!("output promotion failed: {e}");
                warn!(task_id = %task.id, "{message}");
                self.tasks.annotate_error(&task.id, &message).await?;
                return Err(ApiError::internal(message));
            }
        };

        // output is safe now; a failure to drop the source is logged, not fatal
        match tokio::fs::remove_dir_all(&task.source_path).await {
            Ok(()) => info!(task_id = %task.id, "Source directory removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(
                    task_id = %task.id,
                    "Source directory could not be removed: {e}"
                );
                self.notifier.notify(format!(
                    "Completed {} but the source directory needs manual cleanup",
                    task.source_name
                ));
            }
        }

        self.tasks
            .mark_completed(
                &task.id,
                &final_path,
                output_size_bytes,
                processing_time_seconds,
            )
            .await?;

        let record = ProcessingAttemptRecord::new(
            task.id.clone(),
            task.dispatch_generation,
            AttemptOutcome::Completed,
        )
        .with_duration(processing_time_seconds);
        self.tasks.record_attempt(&record).await?;

        metrics::record_task_completed(processing_time_seconds, output_size_bytes);
        let gb = output_size_bytes as f64 / 1024f64.powi(3);
        let minutes = processing_time_seconds / 60.0;
        self.notifier.notify(format!(
            "Completed: {} ({gb:.1} GB in {minutes:.0} min)",
            task.source_name
        ));

        info!(
            task_id = %task.id,
            output = %final_path.display(),
            "Task completed"
        );
        Ok(ReconcileOutcome::Completed)
    }

    /// Failure path: count the attempt, then retry or fail by category.
    async fn fail(
        &self,
        task: Task,
        error: &str,
        failure_kind: FailureKind,
        processing_time_seconds: Option<f64>,
    ) -> ApiResult<ReconcileOutcome> {
        let outcome = match failure_kind {
            FailureKind::Cancelled => AttemptOutcome::Cancelled,
            _ => AttemptOutcome::Failed,
        };
        let mut record =
            ProcessingAttemptRecord::new(task.id.clone(), task.dispatch_generation, outcome)
                .with_error(error);
        if let Some(seconds) = processing_time_seconds {
            record = record.with_duration(seconds);
        }
        self.tasks.record_attempt(&record).await?;

        if !failure_kind.is_retryable() {
            // the source will not become valid on retry without manual
            // correction
            self.tasks.mark_failed(&task.id, error).await?;
            metrics::record_task_failed("analysis");
            self.notifier
                .notify(format!("Failed: {} ({error})", task.source_name));
            return Ok(ReconcileOutcome::FailedPermanently);
        }

        let updated = self
            .tasks
            .request_retry(
                &task.id,
                error,
                self.config.transcode_attempt_cap,
                chrono::Duration::from_std(self.config.retry_backoff)
                    .unwrap_or_else(|_| chrono::Duration::seconds(1800)),
            )
            .await?;

        if updated.status == TaskStatus::Failed {
            metrics::record_task_failed("transcode");
            self.notifier.notify(format!(
                "Failed permanently: {} after {} attempts ({error})",
                task.source_name, updated.attempts
            ));
            Ok(ReconcileOutcome::FailedPermanently)
        } else {
            metrics::record_task_retried();
            self.notifier.notify(format!(
                "Retrying {} (attempt {}): {error}",
                task.source_name, updated.attempts
            ));
            Ok(ReconcileOutcome::RetryScheduled)
        }
    }
}
