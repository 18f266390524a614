use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use chainpolicy_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Opens a pool, creating the database file on first use. In-memory databases
/// are private to a connection, so their pool holds exactly one.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let in_memory = is_in_memory(database_url);
    let max_connections = if in_memory { 1 } else { max_connections.max(1) };

    let mut pool_options = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)));
    if in_memory {
        pool_options = pool_options.idle_timeout(None).max_lifetime(None);
    }

    let pool = pool_options.connect_with(options).await?;

    tracing::debug!(
        event_name = "db.pool_opened",
        max_connections,
        "opened sqlite pool"
    );
    Ok(pool)
}
