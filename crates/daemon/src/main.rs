//! Mediafetch Task Engine - Main Entry Point
//! JSON-RPC server + worker pool + retention sweeper

mod config;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Import workspace crates
use config::{DaemonConfig, LogFormat};
use mediafetch_api_rpc::{RpcServer, RpcServerConfig};
use mediafetch_core::application::worker::constants::SHUTDOWN_JOIN_TIMEOUT;
use mediafetch_core::application::FetchService;
use mediafetch_core::port::id_provider::UuidProvider;
use mediafetch_core::port::time_provider::SystemTimeProvider;
use mediafetch_infra_system::{YtDlpBackend, YtDlpConfig};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the global subscriber; the guard must live as long as the process
fn init_logging(config: &DaemonConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("mediafetch=info"))
        .context("Failed to create env filter")?;

    let stdout_layer = match config.log_format {
        // Production: JSON structured logging
        LogFormat::Json => fmt::layer().json().boxed(),
        // Development: Pretty formatting with colors
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
    };

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log dir {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "mediafetch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let config = DaemonConfig::from_env()?;

    // 2. Initialize logging
    let _log_guard = init_logging(&config)?;
    info!("Mediafetch Task Engine v{} starting...", VERSION);

    tokio::fs::create_dir_all(&config.engine.work_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create work dir {}",
                config.engine.work_dir.display()
            )
        })?;
    info!(
        work_dir = %config.engine.work_dir.display(),
        max_concurrent = config.engine.max_concurrent,
        allowed_domains = ?config.engine.allowed_domains,
        "Engine configured"
    );

    // 3. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);
    let backend = Arc::new(YtDlpBackend::new(
        YtDlpConfig::default().with_command(&config.ytdlp_command),
    ));
    let service = Arc::new(
        FetchService::new(config.engine.clone(), id_provider, time_provider)
            .with_info_source(backend.clone()),
    );

    // 4. Start worker pool
    let pool = service.spawn_workers(backend);

    // 5. Start retention sweeper
    let sweeper_handle = tokio::spawn(service.sweeper().run(
        config.sweep_interval,
        config.artifact_max_age,
        pool.shutdown_token(),
    ));

    // 6. Start JSON-RPC server
    let rpc_config = RpcServerConfig {
        host: config.rpc_host.clone(),
        port: config.rpc_port,
        rate_limit: config.rate_limit,
    };
    let (rpc_handle, rpc_addr) = RpcServer::new(rpc_config, Arc::clone(&service))
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!(rpc_addr = %rpc_addr, "System ready. Waiting for jobs...");
    info!("Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown: stop intake, then let in-flight jobs finish
    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "RPC server already stopped");
    }
    pool.shutdown_and_join(SHUTDOWN_JOIN_TIMEOUT).await;
    if let Err(e) = sweeper_handle.await {
        warn!(error = %e, "Sweeper task ended abnormally");
    }

    if config.owns_work_dir {
        if let Err(e) = tokio::fs::remove_dir_all(&config.engine.work_dir).await {
            warn!(error = %e, "Failed to remove work dir");
        }
    }

    info!("Shutdown complete.");
    Ok(())
}
