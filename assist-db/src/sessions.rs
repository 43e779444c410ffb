//! Session, run and message management for agent conversation history.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// Message role types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            _ => Err(DbError::InvalidRole(s.to_string())),
        }
    }
}

/// Content block types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        name: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// A message in a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub run_id: String,
    pub role: MessageRole,
    pub content: Vec<ContentBlock>,
    pub model: Option<String>,
    pub created_at: i64,
}

impl Message {
    /// Concatenated text blocks, ignoring tool traffic.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A session (conversation container)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub namespace: String,
    pub agent_name: String,
    pub user_id: Option<String>,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Session info for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub agent_name: String,
    pub user_id: Option<String>,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub run_count: i64,
    pub message_count: i64,
}

/// One user turn within a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub session_id: String,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

/// A user message and the assistant's final reply to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub run_id: String,
    pub user: String,
    pub assistant: String,
    pub created_at: i64,
}

const DEFAULT_TITLE: &str = "New Session";

/// Session repository for database operations
pub struct SessionRepository;

impl SessionRepository {
    /// Create a new session
    pub async fn create(
        pool: &SqlitePool,
        namespace: &str,
        agent_name: &str,
        user_id: Option<&str>,
        title: Option<&str>,
    ) -> DbResult<Session> {
        let id = format!("sess_{}", Uuid::new_v4());
        Self::insert(pool, &id, namespace, agent_name, user_id, title).await
    }

    async fn insert(
        pool: &SqlitePool,
        id: &str,
        namespace: &str,
        agent_name: &str,
        user_id: Option<&str>,
        title: Option<&str>,
    ) -> DbResult<Session> {
        let title = title.unwrap_or(DEFAULT_TITLE).to_string();
        let now = Utc::now().timestamp();

        sqlx::query(
            "INSERT INTO sessions (id, namespace, agent_name, user_id, title, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(namespace)
        .bind(agent_name)
        .bind(user_id)
        .bind(&title)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        info!(namespace, agent_name, "Created new session: {}", id);

        Ok(Session {
            id: id.to_string(),
            namespace: namespace.to_string(),
            agent_name: agent_name.to_string(),
            user_id: user_id.map(str::to_string),
            title,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get session by ID within a namespace
    pub async fn get_by_id(
        pool: &SqlitePool,
        namespace: &str,
        id: &str,
    ) -> DbResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT id, namespace, agent_name, user_id, title, created_at, updated_at
             FROM sessions
             WHERE namespace = ? AND id = ?",
        )
        .bind(namespace)
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(Session::from))
    }

    /// Resume `session_id` when given, creating it under that id if absent;
    /// otherwise start a fresh session.
    ///
    /// Fails with [`DbError::SessionNotFound`] when the id belongs to another
    /// namespace.
    pub async fn get_or_create(
        pool: &SqlitePool,
        namespace: &str,
        agent_name: &str,
        session_id: Option<&str>,
        user_id: Option<&str>,
    ) -> DbResult<Session> {
        let Some(session_id) = session_id.map(str::trim).filter(|id| !id.is_empty()) else {
            return Self::create(pool, namespace, agent_name, user_id, None).await;
        };

        if let Some(session) = Self::get_by_id(pool, namespace, session_id).await? {
            debug!("Resuming session: {}", session.id);
            return Ok(session);
        }

        // Ids are unique across the file; one owned by another namespace
        // is invisible here rather than reusable.
        let (taken,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM sessions WHERE id = ?)")
            .bind(session_id)
            .fetch_one(pool)
            .await?;
        if taken {
            return Err(DbError::SessionNotFound(session_id.to_string()));
        }

        debug!("Session {} not found, creating it", session_id);
        Self::insert(pool, session_id, namespace, agent_name, user_id, None).await
    }

    /// List sessions in a namespace, newest first, optionally for one user
    pub async fn list(
        pool: &SqlitePool,
        namespace: &str,
        user_id: Option<&str>,
    ) -> DbResult<Vec<SessionInfo>> {
        let rows = sqlx::query_as::<_, SessionInfoRow>(
            "SELECT s.id, s.agent_name, s.user_id, s.title, s.created_at, s.updated_at,
                    (SELECT COUNT(*) FROM runs r WHERE r.session_id = s.id) AS run_count,
                    (SELECT COUNT(*) FROM messages m WHERE m.session_id = s.id) AS message_count
             FROM sessions s
             WHERE s.namespace = ? AND (? IS NULL OR s.user_id = ?)
             ORDER BY s.updated_at DESC, s.rowid DESC",
        )
        .bind(namespace)
        .bind(user_id)
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(SessionInfo::from).collect())
    }

    /// Rename a session
    pub async fn rename(
        pool: &SqlitePool,
        namespace: &str,
        id: &str,
        title: &str,
    ) -> DbResult<Session> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            "UPDATE sessions SET title = ?, updated_at = ? WHERE namespace = ? AND id = ?",
        )
        .bind(title)
        .bind(now)
        .bind(namespace)
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::SessionNotFound(id.to_string()));
        }

        Self::get_by_id(pool, namespace, id)
            .await?
            .ok_or_else(|| DbError::SessionNotFound(id.to_string()))
    }

    /// Delete a session with its runs and messages
    pub async fn delete(pool: &SqlitePool, namespace: &str, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM sessions WHERE namespace = ? AND id = ?")
            .bind(namespace)
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::SessionNotFound(id.to_string()));
        }

        info!(namespace, "Deleted session: {}", id);
        Ok(())
    }

    /// Start a new run in a session
    pub async fn start_run(pool: &SqlitePool, session_id: &str) -> DbResult<Run> {
        let id = format!("run_{}", Uuid::new_v4());
        let now = Utc::now().timestamp();

        sqlx::query("INSERT INTO runs (id, session_id, created_at) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(session_id)
            .bind(now)
            .execute(pool)
            .await?;

        Ok(Run {
            id,
            session_id: session_id.to_string(),
            created_at: now,
            completed_at: None,
        })
    }

    /// Mark a run as answered. Only completed runs are replayed as history.
    pub async fn complete_run(pool: &SqlitePool, run_id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE runs SET completed_at = ? WHERE id = ?")
            .bind(Utc::now().timestamp())
            .bind(run_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::RunNotFound(run_id.to_string()));
        }
        Ok(())
    }

    /// Add a message to a run
    pub async fn add_message(
        pool: &SqlitePool,
        session_id: &str,
        run_id: &str,
        role: MessageRole,
        content: Vec<ContentBlock>,
        model: Option<&str>,
    ) -> DbResult<Message> {
        let id = format!("msg_{}", Uuid::new_v4());
        let now = Utc::now().timestamp();
        let content_json = serde_json::to_string(&content)
            .map_err(|e| DbError::Serialization(e.to_string()))?;

        sqlx::query(
            "INSERT INTO messages (id, session_id, run_id, role, content, model, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(session_id)
        .bind(run_id)
        .bind(role.to_string())
        .bind(&content_json)
        .bind(model)
        .bind(now)
        .execute(pool)
        .await?;

        sqlx::query("UPDATE sessions SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(session_id)
            .execute(pool)
            .await?;

        Ok(Message {
            id,
            session_id: session_id.to_string(),
            run_id: run_id.to_string(),
            role,
            content,
            model: model.map(|m| m.to_string()),
            created_at: now,
        })
    }

    /// List messages for a session in insertion order
    pub async fn list_messages(pool: &SqlitePool, session_id: &str) -> DbResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, session_id, run_id, role, content, model, created_at
             FROM messages
             WHERE session_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(session_id)
        .fetch_all(pool)
        .await?;

        rows.into_iter()
            .map(Message::try_from)
            .collect::<DbResult<Vec<_>>>()
    }

    /// All messages of the last `runs` completed runs, oldest first
    pub async fn recent_run_messages(
        pool: &SqlitePool,
        session_id: &str,
        runs: usize,
    ) -> DbResult<Vec<Message>> {
        if runs == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, session_id, run_id, role, content, model, created_at
             FROM messages
             WHERE run_id IN (
                 SELECT id FROM runs
                 WHERE session_id = ? AND completed_at IS NOT NULL
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?
             )
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(session_id)
        .bind(runs as i64)
        .fetch_all(pool)
        .await?;

        rows.into_iter()
            .map(Message::try_from)
            .collect::<DbResult<Vec<_>>>()
    }

    /// The last `pairs` user/assistant exchanges, oldest first
    pub async fn chat_history(
        pool: &SqlitePool,
        session_id: &str,
        pairs: usize,
    ) -> DbResult<Vec<ChatTurn>> {
        let messages = Self::recent_run_messages(pool, session_id, pairs).await?;

        let mut turns: Vec<ChatTurn> = Vec::new();
        for message in messages {
            let text = message.text();
            if text.trim().is_empty() {
                continue;
            }

            let same_run = turns
                .last()
                .is_some_and(|turn| turn.run_id == message.run_id);
            if !same_run {
                turns.push(ChatTurn {
                    run_id: message.run_id.clone(),
                    user: String::new(),
                    assistant: String::new(),
                    created_at: message.created_at,
                });
            }

            if let Some(turn) = turns.last_mut() {
                match message.role {
                    MessageRole::User if turn.user.is_empty() => turn.user = text,
                    MessageRole::User => {}
                    // The last assistant text of a run is its answer.
                    MessageRole::Assistant => turn.assistant = text,
                }
            }
        }

        turns.retain(|turn| !turn.user.is_empty() && !turn.assistant.is_empty());
        Ok(turns)
    }

    /// Count messages in a session
    pub async fn count_messages(pool: &SqlitePool, session_id: &str) -> DbResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM messages WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(pool)
            .await?;
        Ok(row.try_get::<i64, _>("count").unwrap_or(0))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: String,
    namespace: String,
    agent_name: String,
    user_id: Option<String>,
    title: String,
    created_at: i64,
    updated_at: i64,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: row.id,
            namespace: row.namespace,
            agent_name: row.agent_name,
            user_id: row.user_id,
            title: row.title,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SessionInfoRow {
    id: String,
    agent_name: String,
    user_id: Option<String>,
    title: String,
    created_at: i64,
    updated_at: i64,
    run_count: i64,
    message_count: i64,
}

impl From<SessionInfoRow> for SessionInfo {
    fn from(row: SessionInfoRow) -> Self {
        SessionInfo {
            id: row.id,
            agent_name: row.agent_name,
            user_id: row.user_id,
            title: row.title,
            created_at: row.created_at,
            updated_at: row.updated_at,
            run_count: row.run_count,
            message_count: row.message_count,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: String,
    session_id: String,
    run_id: String,
    role: String,
    content: String,
    model: Option<String>,
    created_at: i64,
}

impl TryFrom<MessageRow> for Message {
    type Error = DbError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let content: Vec<ContentBlock> =
            serde_json::from_str(&row.content).map_err(|e| DbError::Serialization(e.to_string()))?;

        Ok(Message {
            id: row.id,
            session_id: row.session_id,
            run_id: row.run_id,
            role: row.role.parse()?,
            content,
            model: row.model,
            created_at: row.created_at,
        })
    }
}
