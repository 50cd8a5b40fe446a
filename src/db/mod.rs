pub mod models;

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::{CrmError, Result};

pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| CrmError::Config(format!("invalid DATABASE_URL: {e}")))?
        .create_if_missing(true)
        // WAL mode: better concurrent read performance
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// In-memory database on a single pinned connection (used in tests).
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| CrmError::Config(format!("invalid sqlite url: {e}")))?
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::raw_sql(include_str!("../../migrations/schema.sql"))
        .execute(pool)
        .await?;
    Ok(())
}

// busy/locked and I/O failures are worth a second attempt; everything else
// (constraint violations, decode errors) is not
pub fn is_transient(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => {
            let msg = db.message().to_lowercase();
            msg.contains("locked") || msg.contains("busy")
        }
        _ => false,
    }
}

/// Run `op`, retrying exactly once after a short backoff if it failed with a
/// transient storage error.
pub async fn retry_once<T, F, Fut>(op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = sqlx::Result<T>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(e) if is_transient(&e) => {
            tracing::warn!("Transient storage error, retrying once: {}", e);
            tokio::time::sleep(Duration::from_millis(50)).await;
            op().await.map_err(CrmError::from)
        }
        Err(e) => Err(e.into()),
    }
}
