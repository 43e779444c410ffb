//! Test helpers for the session database.

use crate::{error::DbResult, session_db::SessionDbPool, sqlite_runtime::create_in_memory_pool};

/// Namespace used by [`create_test_session_pool`].
pub const TEST_NAMESPACE: &str = "test_sessions";

/// Create an in-memory session database for testing
pub async fn create_test_session_pool() -> DbResult<SessionDbPool> {
    create_test_session_pool_in(TEST_NAMESPACE).await
}

/// Create an in-memory session database bound to `namespace`
pub async fn create_test_session_pool_in(namespace: &str) -> DbResult<SessionDbPool> {
    // A single connection keeps every query on the same in-memory database.
    let pool = create_in_memory_pool(1).await?;
    SessionDbPool::run_migrations(&pool).await?;
    Ok(SessionDbPool::from_pool(pool, namespace))
}
