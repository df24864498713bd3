use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

/// Create a SQLite connection pool, creating the database file if it does not exist.
///
/// `max_connections` controls the maximum number of connections in the pool.
/// Pass `AppConfig::db_max_connections` for the user-configured value (default 5).
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await?;

    tracing::info!(max_connections, "Connected to SQLite");
    Ok(pool)
}

/// Apply the embedded schema migrations.
pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Single-connection in-memory database with migrations applied.
///
/// An in-memory SQLite database lives as long as its connection, so the pool is
/// pinned to one connection that never idles out.
pub async fn memory_pool() -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    migrate(&pool).await?;
    Ok(pool)
}
