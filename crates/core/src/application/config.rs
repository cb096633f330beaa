// Engine Configuration
// Defaults + environment overrides (MEDIAFETCH_*)

use crate::error::{AppError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default number of worker slots
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Default number of history entries returned when no limit is given
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Hosts accepted by the URL policy when nothing is configured
pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &["youtube.com", "youtu.be"];

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of worker slots (N)
    pub max_concurrent: usize,

    /// Process-scoped working area; one subdirectory per job
    pub work_dir: PathBuf,

    /// Domains (and their subdomains) accepted at submission
    pub allowed_domains: Vec<String>,

    /// History entries returned when the caller passes no limit
    pub history_limit: usize,

    /// When set, sweeps also evict terminal live records older than this
    pub record_retention: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            work_dir: default_work_dir(),
            allowed_domains: DEFAULT_ALLOWED_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            record_retention: None,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `MEDIAFETCH_MAX_CONCURRENT` | `5` (min 1) |
    /// | `MEDIAFETCH_WORK_DIR` | `<tmp>/mediafetch-<uuid>` |
    /// | `MEDIAFETCH_ALLOWED_DOMAINS` | `youtube.com,youtu.be` |
    /// | `MEDIAFETCH_HISTORY_LIMIT` | `50` |
    /// | `MEDIAFETCH_RECORD_RETENTION_HOURS` | unset (never evict) |
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(n) = env_parse::<usize>("MEDIAFETCH_MAX_CONCURRENT")? {
            config.max_concurrent = n.max(1);
        }

        if let Ok(dir) = std::env::var("MEDIAFETCH_WORK_DIR") {
            if !dir.trim().is_empty() {
                config.work_dir = PathBuf::from(shellexpand::tilde(dir.trim()).into_owned());
            }
        }

        if let Ok(domains) = std::env::var("MEDIAFETCH_ALLOWED_DOMAINS") {
            config.allowed_domains = domains
                .split(',')
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect();
        }

        if let Some(limit) = env_parse::<usize>("MEDIAFETCH_HISTORY_LIMIT")? {
            config.history_limit = limit;
        }

        if let Some(hours) = env_parse::<u64>("MEDIAFETCH_RECORD_RETENTION_HOURS")? {
            config.record_retention = Some(Duration::from_secs(hours.saturating_mul(3600)));
        }

        Ok(config)
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n.max(1);
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_record_retention(mut self, retention: Duration) -> Self {
        self.record_retention = Some(retention);
        self
    }
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join(format!("mediafetch-{}", uuid::Uuid::new_v4().simple()))
}

/// Parse an optional environment variable; unset or empty is `None`
pub fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::Config(format!("{} has an invalid value: {:?}", key, raw))),
        _ => Ok(None),
    }
}
