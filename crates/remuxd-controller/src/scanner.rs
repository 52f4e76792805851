//! Source discovery.
//!
//! Enumerates the raw library folder and creates a task for every
//! well-formed disc source that is neither already tracked nor already
//! converted. Validation is pure, so repeated scans over an unchanged
//! directory are free of side effects and never create duplicates.

use std::path::Path;

use tracing::{debug, info, warn};

use remuxd_media::inspect_source;
use remuxd_store::{StoreError, TaskStore};

use crate::config::ControllerConfig;
use crate::metrics;
use crate::notifier::Notifier;

/// Summary of one scan run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ScanReport {
    pub examined: u32,
    pub tasks_created: u32,
    pub skipped_active: u32,
    pub skipped_processed: u32,
    pub invalid_sources: u32,
}

/// Directory scanner for new disc sources.
pub struct Scanner {
    config: ControllerConfig,
    tasks: TaskStore,
    notifier: Notifier,
}

impl Scanner {
    pub fn new(config: ControllerConfig, tasks: TaskStore, notifier: Notifier) -> Self {
        Self {
            config,
            tasks,
            notifier,
        }
    }

    /// Make sure the library folders exist.
    pub async fn ensure_directories(&self) -> std::io::Result<()> {
        for path in [
            self.config.raw_path(),
            self.config.processed_path(),
            self.config.staging_path(),
        ] {
            if !path.is_dir() {
                tokio::fs::create_dir_all(&path).await?;
                info!("Created directory: {}", path.display());
            }
        }
        Ok(())
    }

    /// Scan the raw folder once.
    pub async fn scan(&self) -> anyhow::Result<ScanReport> {
        let raw = self.config.raw_path();
        let mut report = ScanReport::default();

        if !raw.is_dir() {
            warn!("Raw source directory does not exist: {}", raw.display());
            return Ok(report);
        }

        info!("Scanning for new sources in {}", raw.display());

        let mut entries = tokio::fs::read_dir(&raw).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();

            if !path.is_dir() || name.starts_with('.') {
                continue;
            }
            report.examined += 1;

            if self.tasks.find_active_by_path(&path).await?.is_some() {
                debug!(source = %name, "Skipping: active task exists");
                report.skipped_active += 1;
                continue;
            }

            if self.already_converted(&name) {
                debug!(source = %name, "Skipping: output already exists");
                report.skipped_processed += 1;
                continue;
            }

            let layout = match inspect_source(&path) {
                Ok(layout) => layout,
                Err(e) => {
                    info!(source = %name, "Not a usable disc source: {e}");
                    report.invalid_sources += 1;
                    continue;
                }
            };

            // priority stays at 0: it is an operator override, the source
            // size only tie-breaks claims
            match self
                .tasks
                .create_task(&name, &path, layout.total_stream_bytes, 0)
                .await
            {
                Ok(task) => {
                    let gb = layout.total_stream_bytes as f64 / 1024f64.powi(3);
                    info!(task_id = %task.id, source = %name, "New source queued ({gb:.1} GB)");
                    metrics::record_task_created();
                    self.notifier
                        .notify(format!("New source queued: {name} ({gb:.1} GB)"));
                    report.tasks_created += 1;
                }
                Err(StoreError::DuplicateTask(_)) => {
                    // lost a race with a concurrent create; same outcome as
                    // skipped_active
                    report.skipped_active += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            examined = report.examined,
            created = report.tasks_created,
            "Scan complete"
        );
        Ok(report)
    }

    /// Dedup by name: a previous run already produced this output.
    fn already_converted(&self, source_name: &str) -> bool {
        let processed = self.config.processed_path();
        ["mkv", "mp4"]
            .iter()
            .any(|ext| processed.join(format!("{source_name}.{ext}")).is_file())
            || Self::any_output_with_prefix(&processed, source_name)
    }

    /// Staged outputs carry a duration suffix, so also match on the stem.
    fn any_output_with_prefix(processed: &Path, source_name: &str) -> bool {
        let sanitized = source_name.replace(' ', "_");
        let Ok(entries) = std::fs::read_dir(processed) else {
            return false;
        };
        entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .any(|file| file.starts_with(&sanitized) && file.ends_with(".mkv"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remuxd_store::MemoryStore;
    use std::fs;
    use tempfile::TempDir;

    /// Minimal MPLS bytes: one PlayItem of the given duration.
    fn mpls_bytes(clip: &str, seconds: u64) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"MPLS0200");
        bytes.extend_from_slice(&40u32.to_be_bytes());
        bytes.resize(40, 0);
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&0u16.to_be_bytes());
        bytes.extend_from_slice(&1u16.to_be_bytes());
        bytes.extend_from_slice(&0u16.to_be_bytes());

        let mut body = Vec::new();
        body.extend_from_slice(clip.as_bytes());
        body.extend_from_slice(b"M2TS");
        body.extend_from_slice(&0u16.to_be_bytes());
        body.push(0);
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(&((seconds * 45_000) as u32).to_be_bytes());
        bytes.extend_from_slice(&(body.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&body);
        bytes
    }

    fn write_disc_source(root: &Path, name: &str, seconds: u64) {
        let source = root.join(name);
        fs::create_dir_all(source.join("BDMV/PLAYLIST")).unwrap();
        fs::create_dir_all(source.join("BDMV/STREAM")).unwrap();
        fs::write(
            source.join("BDMV/PLAYLIST/00001.mpls"),
            mpls_bytes("00001", seconds),
        )
        .unwrap();
        fs::write(source.join("BDMV/STREAM/00001.m2ts"), vec![0u8; 2048]).unwrap();
    }

    fn scanner_in(dir: &TempDir) -> Scanner {
        let config = ControllerConfig {
            library_root: dir.path().to_path_buf(),
            ..ControllerConfig::default()
        };
        Scanner::new(
            config,
            TaskStore::new(MemoryStore::shared()),
            Notifier::disabled(),
        )
    }

    #[tokio::test]
    async fn test_scan_twice_creates_one_task() {
        let dir = TempDir::new().unwrap();
        let scanner = scanner_in(&dir);
        scanner.ensure_directories().await.unwrap();
        write_disc_source(&scanner.config.raw_path(), "Arrival", 7200);

        let first = scanner.scan().await.unwrap();
        assert_eq!(first.tasks_created, 1);

        let second = scanner.scan().await.unwrap();
        assert_eq!(second.tasks_created, 0);
        assert_eq!(second.skipped_active, 1);

        let all = scanner
            .tasks
            .list_tasks(&remuxd_store::TaskFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].source_name, "Arrival");
        assert!(all[0].source_size > 0);
        assert_eq!(all[0].priority, 0);
    }

    #[tokio::test]
    async fn test_scan_skips_invalid_and_hidden() {
        let dir = TempDir::new().unwrap();
        let scanner = scanner_in(&dir);
        scanner.ensure_directories().await.unwrap();
        let raw = scanner.config.raw_path();

        // not a disc structure
        fs::create_dir_all(raw.join("RandomFolder")).unwrap();
        // hidden directory
        fs::create_dir_all(raw.join(".trash")).unwrap();
        // loose file
        fs::write(raw.join("readme.txt"), b"x").unwrap();

        let report = scanner.scan().await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.invalid_sources, 1);
        assert_eq!(report.tasks_created, 0);
    }

    #[tokio::test]
    async fn test_scan_skips_already_converted() {
        let dir = TempDir::new().unwrap();
        let scanner = scanner_in(&dir);
        scanner.ensure_directories().await.unwrap();
        write_disc_source(&scanner.config.raw_path(), "Heat", 7200);
        fs::write(scanner.config.processed_path().join("Heat.mkv"), b"done").unwrap();

        let report = scanner.scan().await.unwrap();
        assert_eq!(report.tasks_created, 0);
        assert_eq!(report.skipped_processed, 1);
    }

    #[tokio::test]
    async fn test_scan_matches_suffixed_outputs() {
        let dir = TempDir::new().unwrap();
        let scanner = scanner_in(&dir);
        scanner.ensure_directories().await.unwrap();
        write_disc_source(&scanner.config.raw_path(), "Blade Runner", 7200);
        fs::write(
            scanner
                .config
                .processed_path()
                .join("Blade_Runner_1h57m00s.mkv"),
            b"done",
        )
        .unwrap();

        let report = scanner.scan().await.unwrap();
        assert_eq!(report.skipped_processed, 1);
    }

    #[tokio::test]
    async fn test_missing_raw_directory_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let scanner = scanner_in(&dir);

        let report = scanner.scan().await.unwrap();
        assert_eq!(report.examined, 0);
    }
}
