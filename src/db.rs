use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;

use crate::error::PersistenceError;

/// Open a read-write pool on the catalog database, creating the file if needed.
pub async fn connect(db_path: &Path) -> Result<SqlitePool, PersistenceError> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Open a pool that cannot write. Used for SQL issued by the agent.
///
/// `query_only` rather than a read-only open, so the connection can still
/// attach to the WAL index after the last writer has gone away.
pub async fn connect_read_only(db_path: &Path) -> Result<SqlitePool, PersistenceError> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .pragma("query_only", "ON");

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await?;

    Ok(pool)
}
