use std::path::Path;
use std::sync::OnceLock;

use chrono::Utc;
use libsqlite3_sys::{SQLITE_OK, sqlite3, sqlite3_api_routines, sqlite3_auto_extension};
use sqlite_vec::sqlite3_vec_init;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};

use tracing::warn;

use crate::errors::{KnowledgeError, KnowledgeResult};

static SQLITE_VEC_INIT_RC: OnceLock<i32> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    pool: SqlitePool,
}

impl KnowledgeStore {
    pub async fn open(db_path: &Path) -> KnowledgeResult<Self> {
        init_sqlite_vec_once()?;
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode = WAL")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA synchronous = NORMAL")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA cache_size = -64000")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations/knowledge").run(&pool).await?;

        drop_unpartitioned_vec_table(&pool).await?;

        // Recreate the vector table if the dimension was pinned earlier.
        if let Some(dim) = embedding_dim(&pool).await? {
            ensure_vec_table_dim(&pool, dim).await?;
        }

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn init_sqlite_vec_once() -> KnowledgeResult<()> {
    let rc = *SQLITE_VEC_INIT_RC.get_or_init(|| unsafe {
        type SqliteVecInitFn =
            unsafe extern "C" fn(*mut sqlite3, *mut *const i8, *const sqlite3_api_routines) -> i32;

        sqlite3_auto_extension(Some(std::mem::transmute::<*const (), SqliteVecInitFn>(
            sqlite3_vec_init as *const (),
        )))
    });

    if rc == SQLITE_OK {
        Ok(())
    } else {
        Err(KnowledgeError::SqliteVec(format!(
            "sqlite-vec init failed with code {rc}"
        )))
    }
}

/// Dimension pinned by the first stored embedding.
pub async fn embedding_dim(pool: &SqlitePool) -> KnowledgeResult<Option<usize>> {
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT value FROM meta WHERE key = 'embedding_dim' LIMIT 1")
            .fetch_optional(pool)
            .await?;
    Ok(existing.and_then(|(value,)| value.parse::<usize>().ok()))
}

async fn vec_table_sql(conn: &mut SqliteConnection) -> KnowledgeResult<Option<String>> {
    let table: Option<(String,)> = sqlx::query_as(
        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = 'chunk_vec'",
    )
    .fetch_optional(&mut *conn)
    .await?;
    Ok(table.map(|(sql,)| sql))
}

async fn vec_table_exists(conn: &mut SqliteConnection) -> KnowledgeResult<bool> {
    Ok(vec_table_sql(conn).await?.is_some())
}

/// Drop a vector table created without the `collection` partition column.
///
/// Its chunks lose their embedding marker so the next load embeds them again.
async fn drop_unpartitioned_vec_table(pool: &SqlitePool) -> KnowledgeResult<()> {
    let mut tx = pool.begin().await?;
    let Some(sql) = vec_table_sql(&mut tx).await? else {
        return Ok(());
    };
    if sql.to_lowercase().contains("partition key") {
        return Ok(());
    }

    warn!("vector table has no collection partition, dropping it for re-embedding");
    sqlx::query("DROP TABLE chunk_vec").execute(&mut *tx).await?;
    sqlx::query("UPDATE chunks SET embedding_model = NULL, embedding_dim = NULL")
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Create the vector table for `dimension`, or check it matches the pinned one.
pub async fn ensure_vec_table_dim(pool: &SqlitePool, dimension: usize) -> KnowledgeResult<()> {
    if let Some(expected) = embedding_dim(pool).await?
        && expected != dimension
    {
        return Err(KnowledgeError::EmbeddingDimMismatch {
            expected,
            actual: dimension,
        });
    }

    let mut conn = pool.acquire().await?;
    if !vec_table_exists(&mut conn).await? {
        let create_sql = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS chunk_vec USING vec0(collection text partition key, embedding float[{}])",
            dimension
        );
        sqlx::query(&create_sql).execute(&mut *conn).await?;
    }

    sqlx::query("INSERT OR REPLACE INTO meta (key, value) VALUES ('embedding_dim', ?)")
        .bind(dimension.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(())
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DocumentRecord {
    pub id: i64,
    pub source_url: String,
    pub title: String,
    pub content_hash: String,
    pub fetched_at: String,
}

#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub chunk_index: i64,
    pub title: String,
    pub content: String,
    pub content_hash: String,
    pub embedding_model: Option<String>,
    pub embedding_dim: Option<i64>,
}

pub async fn get_document(
    pool: &SqlitePool,
    collection: &str,
    source_url: &str,
) -> KnowledgeResult<Option<DocumentRecord>> {
    let record = sqlx::query_as::<_, DocumentRecord>(
        "SELECT id, source_url, title, content_hash, fetched_at
         FROM documents WHERE collection = ? AND source_url = ?",
    )
    .bind(collection)
    .bind(source_url)
    .fetch_optional(pool)
    .await?;
    Ok(record)
}

pub async fn list_documents(
    pool: &SqlitePool,
    collection: &str,
) -> KnowledgeResult<Vec<DocumentRecord>> {
    let records = sqlx::query_as::<_, DocumentRecord>(
        "SELECT id, source_url, title, content_hash, fetched_at
         FROM documents WHERE collection = ? ORDER BY id ASC",
    )
    .bind(collection)
    .fetch_all(pool)
    .await?;
    Ok(records)
}

pub async fn upsert_document(
    conn: &mut SqliteConnection,
    collection: &str,
    source_url: &str,
    title: &str,
    content_hash: &str,
) -> KnowledgeResult<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"INSERT INTO documents (collection, source_url, title, content_hash, fetched_at)
           VALUES (?, ?, ?, ?, ?)
           ON CONFLICT(collection, source_url) DO UPDATE SET
               title = excluded.title,
               content_hash = excluded.content_hash,
               fetched_at = excluded.fetched_at
           RETURNING id"#,
    )
    .bind(collection)
    .bind(source_url)
    .bind(title)
    .bind(content_hash)
    .bind(Utc::now().to_rfc3339())
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

async fn delete_chunk_rows(conn: &mut SqliteConnection, chunk_ids: &[i64]) -> KnowledgeResult<()> {
    if chunk_ids.is_empty() {
        return Ok(());
    }
    let placeholders = chunk_ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");

    let fts_sql = format!("DELETE FROM chunk_fts WHERE chunk_id IN ({})", placeholders);
    let mut q = sqlx::query(&fts_sql);
    for chunk_id in chunk_ids {
        q = q.bind(chunk_id);
    }
    q.execute(&mut *conn).await?;

    if vec_table_exists(conn).await? {
        let vec_sql = format!("DELETE FROM chunk_vec WHERE rowid IN ({})", placeholders);
        let mut q = sqlx::query(&vec_sql);
        for chunk_id in chunk_ids {
            q = q.bind(chunk_id);
        }
        q.execute(&mut *conn).await?;
    }

    let chunk_sql = format!("DELETE FROM chunks WHERE id IN ({})", placeholders);
    let mut q = sqlx::query(&chunk_sql);
    for chunk_id in chunk_ids {
        q = q.bind(chunk_id);
    }
    q.execute(&mut *conn).await?;

    Ok(())
}

pub async fn replace_chunks(
    conn: &mut SqliteConnection,
    document_id: i64,
    collection: &str,
    document_title: &str,
    chunks: &[ChunkRecord],
) -> KnowledgeResult<Vec<i64>> {
    let existing: Vec<(i64,)> = sqlx::query_as("SELECT id FROM chunks WHERE document_id = ?")
        .bind(document_id)
        .fetch_all(&mut *conn)
        .await?;
    let existing: Vec<i64> = existing.into_iter().map(|(id,)| id).collect();
    delete_chunk_rows(conn, &existing).await?;

    let mut ids = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let result = sqlx::query(
            r#"INSERT INTO chunks (document_id, collection, chunk_index, title, content, content_hash, embedding_model, embedding_dim)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(document_id)
        .bind(collection)
        .bind(chunk.chunk_index)
        .bind(&chunk.title)
        .bind(&chunk.content)
        .bind(&chunk.content_hash)
        .bind(&chunk.embedding_model)
        .bind(chunk.embedding_dim)
        .execute(&mut *conn)
        .await?;

        let chunk_id = result.last_insert_rowid();
        ids.push(chunk_id);

        sqlx::query(
            r#"INSERT INTO chunk_fts (content, title, document_title, collection, document_id, chunk_id)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&chunk.content)
        .bind(&chunk.title)
        .bind(document_title)
        .bind(collection)
        .bind(document_id)
        .bind(chunk_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(ids)
}

pub async fn upsert_vec(
    conn: &mut SqliteConnection,
    chunk_id: i64,
    collection: &str,
    embedding: &[f32],
) -> KnowledgeResult<()> {
    let payload = serde_json::to_string(embedding)
        .map_err(|e| KnowledgeError::Embedding(format!("embedding serialize failed: {e}")))?;

    // vec0 has no upsert; clear the rowid first.
    sqlx::query("DELETE FROM chunk_vec WHERE rowid = ?")
        .bind(chunk_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("INSERT INTO chunk_vec(rowid, collection, embedding) VALUES (?, ?, ?)")
        .bind(chunk_id)
        .bind(collection)
        .bind(payload)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Remove every document of a collection with its chunks and index rows.
pub async fn clear_collection(pool: &SqlitePool, collection: &str) -> KnowledgeResult<u64> {
    let mut tx = pool.begin().await?;
    let chunk_ids: Vec<(i64,)> = sqlx::query_as("SELECT id FROM chunks WHERE collection = ?")
        .bind(collection)
        .fetch_all(&mut *tx)
        .await?;
    let chunk_ids: Vec<i64> = chunk_ids.into_iter().map(|(id,)| id).collect();
    delete_chunk_rows(&mut tx, &chunk_ids).await?;

    let result = sqlx::query("DELETE FROM documents WHERE collection = ?")
        .bind(collection)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected())
}

/// Distinct embedding models recorded on a document's chunks (`None` = not embedded).
pub async fn document_embedding_models(
    pool: &SqlitePool,
    document_id: i64,
) -> KnowledgeResult<Vec<Option<String>>> {
    let rows: Vec<(Option<String>,)> =
        sqlx::query_as("SELECT DISTINCT embedding_model FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(model,)| model).collect())
}

pub async fn count_chunks(pool: &SqlitePool, collection: &str) -> KnowledgeResult<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chunks WHERE collection = ?")
        .bind(collection)
        .fetch_one(pool)
        .await?;
    Ok(count)
}
