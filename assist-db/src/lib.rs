//! assist-db: SQLite session store for the assistant gateway.
//!
//! This crate provides database operations for:
//! - Sessions scoped by a storage namespace
//! - Runs (one user turn and everything done to answer it)
//! - Messages with structured content blocks

pub mod error;
pub mod session_db;
pub mod sessions;
mod sqlite_runtime;

// Re-export commonly used types
pub use error::{DbError, DbResult};
pub use session_db::SessionDbPool;
pub use sessions::{
    ChatTurn, ContentBlock, Message, MessageRole, Run, Session, SessionInfo, SessionRepository,
};

// Re-export test helpers when running tests or when test-helpers feature is enabled
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
