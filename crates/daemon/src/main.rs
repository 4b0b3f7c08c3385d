//! Outbox Worker - Main Entry Point
//! Runs one logging handler per configured key against the SQLite outbox

mod config;
mod handlers;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{DaemonConfig, LogFormat};
use outbox_core::application::worker::shutdown_channel;
use outbox_core::application::{QueueService, WorkerEngine};
use outbox_core::port::SystemTimeProvider;
use outbox_infra_sqlite::{create_pool, run_migrations, SqliteJobStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_logging(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("outbox=info"))
        .context("Failed to create env filter")?;

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty())
            .init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration, then logging
    let config = DaemonConfig::from_env()?;
    init_logging(config.log_format)?;

    info!("Outbox worker v{} starting...", VERSION);

    // 2. Database
    if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }
    info!(db_path = %config.db_path, "Initializing database...");

    let pool = create_pool(&config.database_url())
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 3. Wiring
    let store = Arc::new(SqliteJobStore::new(pool.clone()));
    let service = Arc::new(QueueService::new(store, Arc::new(SystemTimeProvider)));

    let engine = handlers::from_config(&config)
        .into_iter()
        .fold(WorkerEngine::new(service), WorkerEngine::register);
    info!(keys = ?engine.handler_keys(), "Handlers registered");

    // 4. Run until Ctrl+C
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let engine_handle = tokio::spawn(async move {
        if let Err(e) = engine.run(shutdown_rx).await {
            tracing::error!(error = %e, "Worker engine failed");
        }
    });

    info!("Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Waiting for in-flight jobs...");
    shutdown_tx.shutdown();
    if tokio::time::timeout(std::time::Duration::from_secs(30), engine_handle)
        .await
        .is_err()
    {
        tracing::warn!("In-flight jobs did not finish within 30s");
    }

    pool.close().await;
    info!("Shutdown complete.");

    Ok(())
}
