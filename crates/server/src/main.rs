mod bootstrap;
mod health;
mod notification_drain;
mod sweep_worker;

use std::time::Duration;

use anyhow::Result;
use souk_core::config::{AppConfig, LoadOptions};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use souk_core::config::LogFormat::*;

    // RUST_LOG wins over the configured level when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let bootstrap::Application { config, db_pool, sweeper, notifications } = app;

    health::spawn(
        &config.server.bind_address,
        config.server.health_check_port,
        health::HealthState::new(db_pool.clone(), config.sweeper.enabled),
    )
    .await?;

    let drain = notification_drain::spawn_notification_drain(notifications);
    let worker = if config.sweeper.enabled {
        Some(sweep_worker::start_sweep_worker(
            sweeper.clone(),
            Duration::from_secs(config.sweeper.interval_secs),
        ))
    } else {
        tracing::info!(event_name = "system.sweeper.disabled", "sweeper disabled by config");
        None
    };

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        auto_conversion = config.auto_conversion.enabled,
        max_rounds = config.negotiation.max_rounds,
        "souk-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "souk-server stopping"
    );

    if let Some(worker) = worker {
        worker.abort();
        // a cancelled sweep rolls back its open transaction
        let _ = worker.await;
    }
    // the sweeper owns the last notification sender; dropping it closes the queue
    drop(sweeper);
    let grace = Duration::from_secs(config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, drain).await {
        Ok(Ok(drained)) => {
            tracing::info!(
                event_name = "system.server.drained",
                drained,
                "notification queue drained"
            )
        }
        Ok(Err(error)) => {
            tracing::warn!(
                event_name = "system.server.drain_failed",
                error = %error,
                "drain task failed"
            )
        }
        Err(_) => tracing::warn!(
            event_name = "system.server.drain_timeout",
            grace_secs = grace.as_secs(),
            "notification queue not drained before shutdown deadline"
        ),
    }
    db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
