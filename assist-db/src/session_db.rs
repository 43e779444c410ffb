//! Session database connection pool and initialization.

use std::path::Path;

use sqlx::SqlitePool;
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::sqlite_runtime::create_file_pool;

/// Session database pool wrapper, bound to one storage namespace.
#[derive(Debug, Clone)]
pub struct SessionDbPool {
    pool: SqlitePool,
    namespace: String,
}

impl SessionDbPool {
    /// Open (or create) the session database at `db_path` and run migrations.
    pub async fn open(db_path: &Path, namespace: &str) -> DbResult<Self> {
        info!(
            namespace,
            "Initializing session database at: {}",
            db_path.display()
        );

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let pool = create_file_pool(db_path, 5).await?;
        Self::run_migrations(&pool).await?;

        info!("Session database initialized successfully");
        Ok(Self::from_pool(pool, namespace))
    }

    /// Wrap an already migrated pool.
    pub fn from_pool(pool: SqlitePool, namespace: &str) -> Self {
        Self {
            pool,
            namespace: namespace.to_string(),
        }
    }

    /// Get the inner SQLx pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Storage namespace sessions are scoped to
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub(crate) async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
        sqlx::migrate!("./migrations/sessions")
            .run(pool)
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;

        info!("Session database migrations completed");
        Ok(())
    }

    /// Close the pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
