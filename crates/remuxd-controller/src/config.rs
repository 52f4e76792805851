//! Controller configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Controller configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Library root shared with the worker
    pub library_root: PathBuf,
    /// Folder with raw disc sources
    pub raw_folder: String,
    /// Folder promoted outputs land in
    pub processed_folder: String,
    /// Folder the worker stages outputs in
    pub staging_folder: String,
    /// Worker base URL
    pub worker_url: String,
    /// Webhook URL advertised to the worker
    pub callback_url: String,
    /// Timeout for the worker accept call (seconds, independent of the
    /// hours-long processing time)
    pub accept_timeout: Duration,
    /// Dispatcher loop interval
    pub dispatch_interval: Duration,
    /// Send retries against an unreachable/busy worker per dispatch
    pub send_retry_attempts: u32,
    /// Fixed interval between those send retries
    pub send_retry_interval: Duration,
    /// Backoff before a retrying task re-enters pending
    pub retry_backoff: Duration,
    /// Overall dispatch attempt cap
    pub max_attempts: u32,
    /// Conversion failure attempt cap
    pub transcode_attempt_cap: u32,
    /// Minimum main-feature duration in minutes (scanner validation)
    pub min_title_minutes: u64,
    /// A task in sent/processing with no update for this long is suspect
    pub stale_task_ceiling: Duration,
    /// Stale check loop interval
    pub stale_check_interval: Duration,
    /// Retention window for terminal tasks, in days
    pub retention_days: i64,
    /// CORS origins for the task API
    pub cors_origins: Vec<String>,
    /// Max request body size in bytes
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            library_root: PathBuf::from("/mnt/library"),
            raw_folder: "BluRayRAW".to_string(),
            processed_folder: "BluRayProcessed".to_string(),
            staging_folder: "BluRayTemp".to_string(),
            worker_url: "http://localhost:8001".to_string(),
            callback_url: "http://localhost:8080/api/webhook/status".to_string(),
            accept_timeout: Duration::from_secs(10),
            dispatch_interval: Duration::from_secs(60),
            send_retry_attempts: 3,
            send_retry_interval: Duration::from_secs(1800), // 30 minutes
            retry_backoff: Duration::from_secs(1800),
            max_attempts: 3,
            transcode_attempt_cap: 2,
            min_title_minutes: 60,
            stale_task_ceiling: Duration::from_secs(6 * 3600),
            stale_check_interval: Duration::from_secs(300),
            retention_days: 60,
            cors_origins: vec!["*".to_string()],
            max_body_size: 1024 * 1024,
            environment: "development".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("CONTROLLER_HOST").unwrap_or(defaults.host),
            port: env_parse("CONTROLLER_PORT", defaults.port),
            library_root: std::env::var("LIBRARY_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.library_root),
            raw_folder: std::env::var("RAW_FOLDER").unwrap_or(defaults.raw_folder),
            processed_folder: std::env::var("PROCESSED_FOLDER")
                .unwrap_or(defaults.processed_folder),
            staging_folder: std::env::var("STAGING_FOLDER").unwrap_or(defaults.staging_folder),
            worker_url: std::env::var("WORKER_URL").unwrap_or(defaults.worker_url),
            callback_url: std::env::var("CALLBACK_URL").unwrap_or(defaults.callback_url),
            accept_timeout: Duration::from_secs(env_parse("ACCEPT_TIMEOUT_SECS", 10)),
            dispatch_interval: Duration::from_secs(env_parse("DISPATCH_INTERVAL_SECS", 60)),
            send_retry_attempts: env_parse("DISPATCH_SEND_ATTEMPTS", defaults.send_retry_attempts),
            send_retry_interval: Duration::from_secs(env_parse("DISPATCH_SEND_RETRY_SECS", 1800)),
            retry_backoff: Duration::from_secs(env_parse("RETRY_BACKOFF_SECS", 1800)),
            max_attempts: env_parse("MAX_RETRY_ATTEMPTS", defaults.max_attempts),
            transcode_attempt_cap: env_parse(
                "TRANSCODE_ATTEMPT_CAP",
                defaults.transcode_attempt_cap,
            ),
            min_title_minutes: env_parse("MIN_TITLE_MINUTES", defaults.min_title_minutes),
            stale_task_ceiling: Duration::from_secs(env_parse(
                "STALE_TASK_CEILING_SECS",
                6 * 3600,
            )),
            stale_check_interval: Duration::from_secs(env_parse("STALE_CHECK_INTERVAL_SECS", 300)),
            retention_days: env_parse("RETENTION_DAYS", defaults.retention_days),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            max_body_size: env_parse("MAX_BODY_SIZE", defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    pub fn raw_path(&self) -> PathBuf {
        self.library_root.join(&self.raw_folder)
    }

    pub fn processed_path(&self) -> PathBuf {
        self.library_root.join(&self.processed_folder)
    }

    pub fn staging_path(&self) -> PathBuf {
        self.library_root.join(&self.staging_folder)
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
