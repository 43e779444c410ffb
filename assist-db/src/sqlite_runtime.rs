//! SQLite pool construction for the session store.

use std::path::Path;
use std::time::Duration;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
};

use crate::error::DbResult;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool over a database file, created on first use. Concurrent runs rely on
/// WAL mode and the busy timeout rather than on any locking of our own.
pub(crate) async fn create_file_pool(db_path: &Path, max_connections: u32) -> DbResult<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    open_pool(options, max_connections).await
}

#[cfg(any(test, feature = "test-helpers"))]
pub(crate) async fn create_in_memory_pool(max_connections: u32) -> DbResult<SqlitePool> {
    let options = SqliteConnectOptions::new().filename(":memory:");
    open_pool(options, max_connections).await
}

async fn open_pool(options: SqliteConnectOptions, max_connections: u32) -> DbResult<SqlitePool> {
    let options = options
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT)
        .pragma("cache_size", "-64000");

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    Ok(pool)
}
