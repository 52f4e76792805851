//! The worker's single job slot.
//!
//! Exclusivity is modeled as an explicit lock object rather than caller
//! discipline: accepting a job means acquiring the slot, and every exit path
//! (success, failure, cancellation, panic) releases it through the lease.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::watch;
use tracing::{info, warn};

use remuxd_models::{TaskId, WorkerStatus};

#[derive(Debug)]
struct ActiveJob {
    task_id: TaskId,
    source_name: String,
    started_at: Instant,
    progress_percent: f64,
    phase: String,
    cancel_tx: watch::Sender<bool>,
}

/// Single-occupancy slot guarding the worker's one concurrent conversion.
#[derive(Clone, Default, Debug)]
pub struct JobSlot {
    inner: Arc<Mutex<Option<ActiveJob>>>,
}

impl JobSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<ActiveJob>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Try to take the slot for a task. Fails with the occupying task's id
    /// when another job is already active.
    pub fn try_acquire(
        &self,
        task_id: &TaskId,
        source_name: &str,
    ) -> Result<SlotLease, TaskId> {
        let mut slot = self.lock();
        if let Some(active) = slot.as_ref() {
            return Err(active.task_id.clone());
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        *slot = Some(ActiveJob {
            task_id: task_id.clone(),
            source_name: source_name.to_string(),
            started_at: Instant::now(),
            progress_percent: 0.0,
            phase: "analyzing".to_string(),
            cancel_tx,
        });

        info!(task_id = %task_id, "Job slot acquired");
        Ok(SlotLease {
            slot: self.clone(),
            task_id: task_id.clone(),
            cancel_rx,
            released: false,
        })
    }

    /// Task currently holding the slot, if any.
    pub fn current_task_id(&self) -> Option<TaskId> {
        self.lock().as_ref().map(|job| job.task_id.clone())
    }

    /// Update progress for the active job (ignored if the slot moved on).
    pub fn set_progress(&self, task_id: &TaskId, percent: f64, phase: &str) {
        let mut slot = self.lock();
        if let Some(job) = slot.as_mut() {
            if &job.task_id == task_id {
                job.progress_percent = percent.clamp(0.0, 100.0);
                job.phase = phase.to_string();
            }
        }
    }

    /// Signal cancellation of the active job. Returns `false` when the given
    /// task is not the one occupying the slot.
    pub fn request_cancel(&self, task_id: &TaskId) -> bool {
        let slot = self.lock();
        match slot.as_ref() {
            Some(job) if &job.task_id == task_id => {
                info!(task_id = %task_id, "Cancellation requested");
                job.cancel_tx.send(true).is_ok()
            }
            _ => false,
        }
    }

    /// Snapshot for the status endpoints.
    pub fn status(&self) -> WorkerStatus {
        match self.lock().as_ref() {
            Some(job) => WorkerStatus {
                task_id: Some(job.task_id.clone()),
                is_processing: true,
                progress_percent: job.progress_percent,
                status: job.phase.clone(),
                source_name: Some(job.source_name.clone()),
                elapsed_seconds: job.started_at.elapsed().as_secs_f64(),
            },
            None => WorkerStatus::idle(),
        }
    }

    fn release(&self, task_id: &TaskId) {
        let mut slot = self.lock();
        match slot.as_ref() {
            Some(job) if &job.task_id == task_id => {
                *slot = None;
                info!(task_id = %task_id, "Job slot released");
            }
            Some(job) => {
                warn!(
                    holder = %job.task_id,
                    releasing = %task_id,
                    "Release for a task that does not hold the slot"
                );
            }
            None => {}
        }
    }
}

/// Lease handed to the processing pipeline. Releasing (explicitly or on
/// drop) frees the slot for the next accept.
#[derive(Debug)]
pub struct SlotLease {
    slot: JobSlot,
    task_id: TaskId,
    pub cancel_rx: watch::Receiver<bool>,
    released: bool,
}

impl SlotLease {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Release the slot. Idempotent.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.slot.release(&self.task_id);
        }
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        // safety net for panics and early returns
        self.release_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_reports_busy() {
        let slot = JobSlot::new();
        let first = TaskId::from_string("t-1");
        let lease = slot.try_acquire(&first, "Movie").unwrap();

        let holder = slot
            .try_acquire(&TaskId::from_string("t-2"), "Other")
            .unwrap_err();
        assert_eq!(holder, first);

        lease.release();
        assert!(slot.try_acquire(&TaskId::from_string("t-2"), "Other").is_ok());
    }

    #[test]
    fn test_lease_drop_releases() {
        let slot = JobSlot::new();
        {
            let _lease = slot.try_acquire(&TaskId::from_string("t-1"), "Movie").unwrap();
            assert!(slot.current_task_id().is_some());
        }
        assert!(slot.current_task_id().is_none());
    }

    #[test]
    fn test_cancel_flows_through_watch() {
        let slot = JobSlot::new();
        let task = TaskId::from_string("t-1");
        let lease = slot.try_acquire(&task, "Movie").unwrap();

        assert!(!*lease.cancel_rx.borrow());
        assert!(slot.request_cancel(&task));
        assert!(*lease.cancel_rx.borrow());

        // cancelling a task that is not in the slot does nothing
        assert!(!slot.request_cancel(&TaskId::from_string("other")));
    }

    #[test]
    fn test_status_snapshot() {
        let slot = JobSlot::new();
        assert!(!slot.status().is_processing);

        let task = TaskId::from_string("t-1");
        let _lease = slot.try_acquire(&task, "Movie").unwrap();
        slot.set_progress(&task, 42.0, "converting");

        let status = slot.status();
        assert!(status.is_processing);
        assert_eq!(status.task_id, Some(task));
        assert!((status.progress_percent - 42.0).abs() < f64::EPSILON);
        assert_eq!(status.status, "converting");
        assert_eq!(status.source_name.as_deref(), Some("Movie"));
    }

    #[test]
    fn test_progress_clamped() {
        let slot = JobSlot::new();
        let task = TaskId::from_string("t-1");
        let _lease = slot.try_acquire(&task, "Movie").unwrap();

        slot.set_progress(&task, 250.0, "converting");
        assert!((slot.status().progress_percent - 100.0).abs() < f64::EPSILON);
    }
}
