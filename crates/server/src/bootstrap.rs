use std::sync::Arc;

use souk_core::config::{AppConfig, ConfigError, LoadOptions};
use souk_core::{ChannelNotifier, NegotiationManager, Notification, Notifier, Sweeper};
use souk_db::{connect, migrations, DbPool, SqliteStore};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

/// Notifications queued beyond this are dropped with a warning by the managers.
pub const NOTIFICATION_QUEUE_CAPACITY: usize = 1024;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub sweeper: Arc<Sweeper<SqliteStore>>,
    pub notifications: mpsc::Receiver<Notification>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        max_connections = config.database.max_connections,
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let store = SqliteStore::new(db_pool.clone());
    let (notifier, notifications) = ChannelNotifier::new(NOTIFICATION_QUEUE_CAPACITY);
    let notifier: Arc<dyn Notifier> = Arc::new(notifier);
    let negotiations = NegotiationManager::new(store.clone(), notifier, config.negotiation.clone());
    let sweeper = Sweeper::new(store, negotiations, config.auto_conversion.clone());

    Ok(Application { config, db_pool, sweeper: Arc::new(sweeper), notifications })
}

#[cfg(test)]
mod tests {
    use souk_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_rejects_non_sqlite_database_url() {
        let result = bootstrap(overrides("postgres://localhost/souk")).await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("database.url"));
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_wires_the_sweeper() {
        let app = bootstrap(overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('rfq', 'quote', 'negotiation_entry', 'order_intent')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected marketplace tables after bootstrap");
        assert_eq!(table_count, 4);

        let report = app.sweeper.run_sweep().await.expect("sweep on empty database");
        assert_eq!(report.total_changes(), 0);
    }
}
