//! Daemon configuration (environment variables with defaults)

use anyhow::{Context, Result};
use mediafetch_api_rpc::server::{DEFAULT_RPC_HOST, DEFAULT_RPC_PORT};
use mediafetch_api_rpc::RateLimitConfig;
use mediafetch_core::application::config::env_parse;
use mediafetch_core::application::EngineConfig;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;
const DEFAULT_ARTIFACT_MAX_AGE_HOURS: u64 = 24;
const DEFAULT_YTDLP_COMMAND: &str = "yt-dlp";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub engine: EngineConfig,
    pub sweep_interval: Duration,
    pub artifact_max_age: Duration,
    pub rpc_host: String,
    pub rpc_port: u16,
    /// Submissions and info lookups; burst 0 turns the limit off
    pub rate_limit: RateLimitConfig,
    pub ytdlp_command: String,
    pub log_format: LogFormat,
    /// Daily rolling log files are written here when set
    pub log_dir: Option<PathBuf>,
    /// The work dir was generated for this process and is removed on exit
    pub owns_work_dir: bool,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        let engine = EngineConfig::from_env().context("Invalid engine configuration")?;
        let owns_work_dir = non_empty_env("MEDIAFETCH_WORK_DIR").is_none();

        let sweep_interval_secs = env_parse::<u64>("MEDIAFETCH_SWEEP_INTERVAL_SECS")?
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
        let max_age_hours = env_parse::<u64>("MEDIAFETCH_ARTIFACT_MAX_AGE_HOURS")?
            .unwrap_or(DEFAULT_ARTIFACT_MAX_AGE_HOURS);
        let rpc_port = env_parse::<u16>("MEDIAFETCH_RPC_PORT")?.unwrap_or(DEFAULT_RPC_PORT);

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            burst: env_parse::<u32>("MEDIAFETCH_RATE_LIMIT_BURST")?.unwrap_or(defaults.burst),
            per_minute: env_parse::<u32>("MEDIAFETCH_RATE_LIMIT_RATE")?
                .unwrap_or(defaults.per_minute),
        };

        let rpc_host = non_empty_env("MEDIAFETCH_RPC_HOST")
            .unwrap_or_else(|| DEFAULT_RPC_HOST.to_string());
        let ytdlp_command = non_empty_env("MEDIAFETCH_YTDLP_PATH")
            .unwrap_or_else(|| DEFAULT_YTDLP_COMMAND.to_string());

        let log_format = match non_empty_env("MEDIAFETCH_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };
        let log_dir = non_empty_env("MEDIAFETCH_LOG_DIR")
            .map(|d| PathBuf::from(shellexpand::tilde(&d).into_owned()));

        Ok(Self {
            engine,
            sweep_interval: Duration::from_secs(sweep_interval_secs.max(1)),
            artifact_max_age: Duration::from_secs(max_age_hours.saturating_mul(3600)),
            rpc_host,
            rpc_port,
            rate_limit,
            ytdlp_command,
            log_format,
            log_dir,
            owns_work_dir,
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
