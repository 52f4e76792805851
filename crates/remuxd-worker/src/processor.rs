//! The conversion pipeline.
//!
//! One accepted task flows through: resolve source under the mounted
//! library, analyze the disc, select the primary title, remux it into the
//! staging directory, verify the output, then report the outcome through
//! the callback client. The slot lease is released before the terminal
//! callback goes out, so the controller can dispatch the next task the
//! moment it learns about this one.

use std::path::PathBuf;
use std::time::{Instant, SystemTime};

use tokio::sync::mpsc;
use tracing::{info, warn};

use remuxd_media::{
    inspect_source, probe::probe_title_duration, select_primary_title, FfmpegCommand,
    FfmpegRunner,
};
use remuxd_models::{ProcessRequest, StatusCallback};

use crate::callback::CallbackClient;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::TaskLogger;
use crate::slot::{JobSlot, SlotLease};

/// Result of a successful remux, before promotion.
#[derive(Debug)]
struct RemuxOutcome {
    /// File name under the staging directory
    file_name: String,
    /// Output size in bytes
    size: u64,
}

/// Conversion pipeline coordinator.
pub struct Processor {
    config: WorkerConfig,
    slot: JobSlot,
    callbacks: CallbackClient,
}

impl Processor {
    pub fn new(config: WorkerConfig, slot: JobSlot, callbacks: CallbackClient) -> Self {
        Self {
            config,
            slot,
            callbacks,
        }
    }

    /// Run a task to completion and report the outcome.
    ///
    /// Spawned by the accept handler; never returns an error to the caller.
    /// Every outcome is a callback.
    pub async fn process(&self, request: ProcessRequest, lease: SlotLease) {
        let logger = TaskLogger::new(&request.task_id, "remux");
        logger.start(&request.source_name);
        let started = Instant::now();

        let result = self.run_pipeline(&request, &lease, &logger).await;
        let elapsed = started.elapsed().as_secs_f64();

        // free the slot before reporting so the next dispatch is not blocked
        // on callback delivery
        lease.release();

        let callback = match result {
            Ok(outcome) => {
                logger.completion(&format!(
                    "{} ({} bytes in {elapsed:.0}s)",
                    outcome.file_name, outcome.size
                ));
                StatusCallback::Completed {
                    task_id: request.task_id.clone(),
                    dispatch_generation: request.dispatch_generation,
                    output_location: outcome.file_name,
                    processing_time_seconds: elapsed,
                    output_size_bytes: outcome.size,
                }
            }
            Err(e) => {
                logger.failure(&e.to_string());
                StatusCallback::Failed {
                    task_id: request.task_id.clone(),
                    dispatch_generation: request.dispatch_generation,
                    error: e.to_string(),
                    failure_kind: e.failure_kind(),
                    processing_time_seconds: Some(elapsed),
                }
            }
        };

        if let Err(e) = self.callbacks.deliver(&request.callback_url, &callback).await {
            logger.failure(&format!("outcome could not be reported: {e}"));
        }
    }

    async fn run_pipeline(
        &self,
        request: &ProcessRequest,
        lease: &SlotLease,
        logger: &TaskLogger,
    ) -> WorkerResult<RemuxOutcome> {
        let source_dir = self.config.raw_path().join(&request.source_name);
        if !source_dir.is_dir() {
            return Err(WorkerError::SourceMissing(source_dir));
        }

        let layout = inspect_source(&source_dir)?;
        let title =
            select_primary_title(&layout.candidates, self.config.min_title_minutes * 60)?.clone();
        logger.progress(&format!(
            "playlist {} selected ({} s, {} segments)",
            title.playlist_id, title.duration_seconds, title.segment_count
        ));

        self.slot
            .set_progress(&request.task_id, 0.0, "converting");
        self.callbacks
            .notify_progress(
                &request.callback_url,
                &StatusCallback::Processing {
                    task_id: request.task_id.clone(),
                    dispatch_generation: request.dispatch_generation,
                    progress_percent: Some(0.0),
                },
            )
            .await;

        // the probe gives a precise denominator; the parsed playlist
        // duration covers an ffprobe without bluray support
        let total_duration = probe_title_duration(&source_dir, title.playlist_number())
            .await
            .ok()
            .filter(|d| *d > 0.0)
            .unwrap_or(title.duration_seconds as f64);

        let staging = self.config.staging_path();
        tokio::fs::create_dir_all(&staging).await?;
        let file_name = output_file_name(&request.source_name, title.duration_seconds);
        let output_path = staging.join(&file_name);

        let (progress_tx, progress_rx) = mpsc::unbounded_channel::<f64>();
        let reporter = self.spawn_progress_reporter(request, progress_rx);

        let runner = FfmpegRunner::new()
            .with_cancel(lease.cancel_rx.clone())
            .with_timeout(self.config.remux_timeout_secs);
        let command = FfmpegCommand::remux_title(&source_dir, title.playlist_number(), &output_path);

        let slot = self.slot.clone();
        let task_id = request.task_id.clone();
        let run_result = runner
            .run_with_progress(&command, move |progress| {
                let percent = progress.percentage(total_duration);
                slot.set_progress(&task_id, percent, "converting");
                let _ = progress_tx.send(percent);
            })
            .await;

        reporter.abort();

        if let Err(e) = run_result {
            remove_partial(&output_path).await;
            return Err(e.into());
        }

        let size = tokio::fs::metadata(&output_path).await?.len();
        if size < self.config.min_output_bytes {
            remove_partial(&output_path).await;
            return Err(WorkerError::OutputTooSmall {
                bytes: size,
                minimum: self.config.min_output_bytes,
            });
        }

        self.slot.set_progress(&request.task_id, 100.0, "completed");
        Ok(RemuxOutcome { file_name, size })
    }

    /// Forward each new 10% milestone to the controller.
    fn spawn_progress_reporter(
        &self,
        request: &ProcessRequest,
        mut progress_rx: mpsc::UnboundedReceiver<f64>,
    ) -> tokio::task::JoinHandle<()> {
        let callbacks = self.callbacks.clone();
        let callback_url = request.callback_url.clone();
        let task_id = request.task_id.clone();
        let generation = request.dispatch_generation;

        tokio::spawn(async move {
            let mut last_decile = 0u32;
            while let Some(percent) = progress_rx.recv().await {
                let decile = (percent / 10.0) as u32;
                if decile > last_decile {
                    last_decile = decile;
                    callbacks
                        .notify_progress(
                            &callback_url,
                            &StatusCallback::Processing {
                                task_id: task_id.clone(),
                                dispatch_generation: generation,
                                progress_percent: Some(percent),
                            },
                        )
                        .await;
                }
            }
        })
    }

    /// Delete staged outputs older than the given age. Returns the count.
    pub async fn cleanup_staging(&self, older_than_hours: u64) -> WorkerResult<u32> {
        let staging = self.config.staging_path();
        if !staging.is_dir() {
            return Ok(0);
        }

        let cutoff = SystemTime::now() - std::time::Duration::from_secs(older_than_hours * 3600);
        let mut removed = 0u32;
        let mut entries = tokio::fs::read_dir(&staging).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_output = path
                .extension()
                .map(|e| e.eq_ignore_ascii_case("mkv") || e.eq_ignore_ascii_case("partial"))
                .unwrap_or(false);
            if !is_output {
                continue;
            }

            let modified = entry.metadata().await?.modified()?;
            if modified < cutoff {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Could not clean up {}: {e}", path.display()),
                }
            }
        }

        if removed > 0 {
            info!(removed, older_than_hours, "Cleaned up staged outputs");
        }
        Ok(removed)
    }
}

async fn remove_partial(path: &PathBuf) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove partial output {}: {e}", path.display());
        }
    }
}

/// Build the staged output file name: sanitized source name plus the title
/// duration, e.g. `Dune_Part_Two_2h46m00s.mkv`.
fn output_file_name(source_name: &str, duration_seconds: u64) -> String {
    let safe: String = source_name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let safe = safe.trim().replace(' ', "_");
    let safe = if safe.is_empty() { "output" } else { &safe };

    let hours = duration_seconds / 3600;
    let minutes = (duration_seconds % 3600) / 60;
    let seconds = duration_seconds % 60;
    format!("{safe}_{hours}h{minutes:02}m{seconds:02}s.mkv")
}
