//! Worker configuration.

use std::path::PathBuf;

/// Worker configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Identifier reported to the controller
    pub worker_id: String,
    /// Mounted library root (the share the controller also sees)
    pub library_root: PathBuf,
    /// Folder under the library root holding raw disc sources
    pub raw_folder: String,
    /// Folder under the library root used for staged outputs
    pub staging_folder: String,
    /// Minimum main-feature duration in minutes
    pub min_title_minutes: u64,
    /// Kill a remux running longer than this many seconds
    pub remux_timeout_secs: u64,
    /// Outputs smaller than this are treated as a failed conversion
    pub min_output_bytes: u64,
    /// Controller base URL for startup/shutdown notices, if configured
    pub controller_url: Option<String>,
    /// Timeout for callback deliveries in seconds
    pub callback_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
            worker_id: "remuxd-worker".to_string(),
            library_root: PathBuf::from("/mnt/library"),
            raw_folder: "BluRayRAW".to_string(),
            staging_folder: "BluRayTemp".to_string(),
            min_title_minutes: 60,
            remux_timeout_secs: 14_400, // 4 hours
            min_output_bytes: 100 * 1024 * 1024,
            controller_url: None,
            callback_timeout_secs: 10,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("WORKER_HOST").unwrap_or(defaults.host),
            port: std::env::var("WORKER_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            worker_id: std::env::var("WORKER_ID").unwrap_or(defaults.worker_id),
            library_root: std::env::var("LIBRARY_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.library_root),
            raw_folder: std::env::var("RAW_FOLDER").unwrap_or(defaults.raw_folder),
            staging_folder: std::env::var("STAGING_FOLDER").unwrap_or(defaults.staging_folder),
            min_title_minutes: std::env::var("MIN_TITLE_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_title_minutes),
            remux_timeout_secs: std::env::var("WORKER_REMUX_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.remux_timeout_secs),
            min_output_bytes: std::env::var("WORKER_MIN_OUTPUT_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_output_bytes),
            controller_url: std::env::var("CONTROLLER_URL").ok(),
            callback_timeout_secs: std::env::var("WORKER_CALLBACK_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.callback_timeout_secs),
        }
    }

    /// Directory holding raw disc sources.
    pub fn raw_path(&self) -> PathBuf {
        self.library_root.join(&self.raw_folder)
    }

    /// Directory staged outputs are written to.
    pub fn staging_path(&self) -> PathBuf {
        self.library_root.join(&self.staging_folder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_paths() {
        let config = WorkerConfig::default();
        assert_eq!(config.raw_path(), PathBuf::from("/mnt/library/BluRayRAW"));
        assert_eq!(
            config.staging_path(),
            PathBuf::from("/mnt/library/BluRayTemp")
        );
    }
}
