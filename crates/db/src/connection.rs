use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use souk_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Opens the marketplace pool described by the `[database]` section.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

/// `timeout_secs` bounds both pool acquisition and how long a writer waits on SQLite's
/// lock, so concurrent units queue behind each other instead of failing with `SQLITE_BUSY`.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let wait = Duration::from_secs(timeout_secs.max(1));
    let options = SqliteConnectOptions::from_str(database_url)?
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(wait);

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(wait)
        .connect_with(options)
        .await
}

#[cfg(test)]
mod tests {
    use souk_core::config::DatabaseConfig;

    use super::connect;

    #[tokio::test]
    async fn busy_timeout_and_foreign_keys_follow_database_config() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            timeout_secs: 7,
        };
        let pool = connect(&config).await.expect("connect");

        let busy_timeout: i64 =
            sqlx::query_scalar("PRAGMA busy_timeout").fetch_one(&pool).await.expect("pragma");
        assert_eq!(busy_timeout, 7_000);
        let foreign_keys: i64 =
            sqlx::query_scalar("PRAGMA foreign_keys").fetch_one(&pool).await.expect("pragma");
        assert_eq!(foreign_keys, 1);
    }
}
