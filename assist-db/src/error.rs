//! Database error types.

/// Database operation errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// SQL error from sqlx
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Content could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored role is not one we know
    #[error("Invalid message role: {0}")]
    InvalidRole(String),

    /// Session does not exist in this namespace
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Run does not exist
    #[error("Run not found: {0}")]
    RunNotFound(String),
}

/// Result type alias for database operations
pub type DbResult<T> = Result<T, DbError>;
