//! URL-backed knowledge base: ingestion and search over one collection.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use assist_core::{KnowledgeSettings, SearchType, validate_sources};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::chunker::chunk_markdown;
use crate::embeddings::{Embedder, EmbeddingTask};
use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::fetch::{FetchedPage, build_client, fetch_page};
use crate::search::{KnowledgeHit, bm25_search, dense_search, hydrate_hits, rank_fused, rrf_fuse};
use crate::storage::{self, ChunkRecord, KnowledgeStore};

/// Summary of one ingestion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub sources: usize,
    pub documents_indexed: usize,
    pub documents_skipped: usize,
    pub chunks: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<SourceFailure>,
}

/// A source that could not be fetched; the rest of the load continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub url: String,
    pub error: String,
}

/// Result of ingesting a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Indexed { chunks: usize },
    Unchanged,
}

/// Counts for the configured collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub documents: usize,
    pub chunks: usize,
}

pub struct UrlKnowledge {
    store: KnowledgeStore,
    embedder: Arc<dyn Embedder>,
    settings: KnowledgeSettings,
    http: reqwest::Client,
}

impl UrlKnowledge {
    /// Open the index at `db_path`. Sources are not touched until [`load`](Self::load).
    pub async fn open(
        settings: KnowledgeSettings,
        db_path: &Path,
        embedder: Arc<dyn Embedder>,
    ) -> KnowledgeResult<Self> {
        let store = KnowledgeStore::open(db_path).await?;
        let http = build_client(Duration::from_secs(settings.fetch_timeout_seconds))?;
        info!(
            collection = %settings.table_name,
            search_type = %settings.search_type,
            sources = settings.urls.len(),
            "knowledge base opened at {}",
            db_path.display()
        );
        Ok(Self {
            store,
            embedder,
            settings,
            http,
        })
    }

    pub fn collection(&self) -> &str {
        &self.settings.table_name
    }

    pub fn search_type(&self) -> SearchType {
        self.settings.search_type
    }

    pub fn sources(&self) -> &[String] {
        &self.settings.urls
    }

    pub fn embedder_model(&self) -> &str {
        self.embedder.model()
    }

    fn pool(&self) -> &SqlitePool {
        self.store.pool()
    }

    /// Fetch, chunk, embed and index every configured source.
    ///
    /// All sources are validated before the first request; one invalid
    /// entry aborts the load. Fetch failures are reported per source.
    pub async fn load(&self, recreate: bool) -> KnowledgeResult<LoadReport> {
        let urls = validate_sources(&self.settings.urls)?;
        let mut report = LoadReport {
            sources: urls.len(),
            ..LoadReport::default()
        };

        if recreate {
            let removed = storage::clear_collection(self.pool(), self.collection()).await?;
            info!(collection = %self.collection(), removed, "cleared knowledge collection");
        }

        if urls.is_empty() {
            warn!(collection = %self.collection(), "no knowledge sources configured, nothing to load");
            return Ok(report);
        }

        for url in &urls {
            let page = match fetch_page(&self.http, url).await {
                Ok(page) => page,
                Err(err) => {
                    warn!(url = %url, error = %err, "skipping knowledge source");
                    report.failed.push(SourceFailure {
                        url: url.to_string(),
                        error: err.to_string(),
                    });
                    continue;
                }
            };

            match self.ingest_page(&page, recreate).await? {
                IngestOutcome::Indexed { chunks } => {
                    report.documents_indexed += 1;
                    report.chunks += chunks;
                }
                IngestOutcome::Unchanged => report.documents_skipped += 1,
            }
        }

        info!(
            collection = %self.collection(),
            indexed = report.documents_indexed,
            skipped = report.documents_skipped,
            failed = report.failed.len(),
            chunks = report.chunks,
            "knowledge load finished"
        );
        Ok(report)
    }

    /// Index one already fetched page.
    ///
    /// A page is skipped when its content is unchanged and, for the vector
    /// search types, its chunks were embedded by the current model. `force`
    /// always re-indexes.
    pub async fn ingest_page(&self, page: &FetchedPage, force: bool) -> KnowledgeResult<IngestOutcome> {
        let content_hash = hash_text(&page.content);

        if !force
            && let Some(existing) =
                storage::get_document(self.pool(), self.collection(), &page.url).await?
            && existing.content_hash == content_hash
            && self.embeddings_current(existing.id).await?
        {
            info!(url = %page.url, "knowledge source unchanged");
            return Ok(IngestOutcome::Unchanged);
        }

        let chunks = chunk_markdown(&page.content);
        let embeddings = if self.settings.search_type.uses_embeddings() {
            let inputs: Vec<String> = chunks
                .iter()
                .map(|chunk| format!("{}\n\n{}", chunk.title, chunk.content))
                .collect();
            Some(self.embed_all(&inputs).await?)
        } else {
            None
        };

        let dim = embeddings
            .as_ref()
            .and_then(|vectors| vectors.first())
            .map(|v| v.len());
        if let Some(dim) = dim {
            storage::ensure_vec_table_dim(self.pool(), dim).await?;
        }

        let records: Vec<ChunkRecord> = chunks
            .iter()
            .map(|chunk| ChunkRecord {
                chunk_index: chunk.index as i64,
                title: chunk.title.clone(),
                content: chunk.content.clone(),
                content_hash: hash_text(&chunk.content),
                embedding_model: dim.map(|_| self.embedder.model().to_string()),
                embedding_dim: dim.map(|d| d as i64),
            })
            .collect();

        // Document hash, chunks and vectors land together or not at all.
        let mut tx = self.pool().begin().await?;
        let document_id = storage::upsert_document(
            &mut tx,
            self.collection(),
            &page.url,
            &page.title,
            &content_hash,
        )
        .await?;
        let chunk_ids =
            storage::replace_chunks(&mut tx, document_id, self.collection(), &page.title, &records)
                .await?;

        if let Some(vectors) = embeddings {
            for (chunk_id, vector) in chunk_ids.iter().zip(vectors.iter()) {
                storage::upsert_vec(&mut tx, *chunk_id, self.collection(), vector).await?;
            }
        }
        tx.commit().await?;

        info!(url = %page.url, chunks = chunk_ids.len(), "indexed knowledge source");
        Ok(IngestOutcome::Indexed {
            chunks: chunk_ids.len(),
        })
    }

    /// Whether a stored document has the vectors the current search type needs.
    async fn embeddings_current(&self, document_id: i64) -> KnowledgeResult<bool> {
        if !self.settings.search_type.uses_embeddings() {
            return Ok(true);
        }
        let models = storage::document_embedding_models(self.pool(), document_id).await?;
        let current = self.embedder.model();
        Ok(models.iter().all(|model| model.as_deref() == Some(current)))
    }

    async fn embed_all(&self, inputs: &[String]) -> KnowledgeResult<Vec<Vec<f32>>> {
        let batch = self.settings.embedding_batch.max(1);
        let mut vectors = Vec::with_capacity(inputs.len());
        for group in inputs.chunks(batch) {
            let mut embedded = self
                .embedder
                .embed_batch(group, EmbeddingTask::Document)
                .await?;
            if embedded.len() != group.len() {
                return Err(KnowledgeError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    group.len(),
                    embedded.len()
                )));
            }
            vectors.append(&mut embedded);
        }

        if let Some(first) = vectors.first() {
            let dim = first.len();
            if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
                return Err(KnowledgeError::EmbeddingDimMismatch {
                    expected: dim,
                    actual: bad.len(),
                });
            }
        }
        Ok(vectors)
    }

    /// Search the collection with the configured search type.
    ///
    /// `limit` defaults to `knowledge.search.max_results`.
    pub async fn search(&self, query: &str, limit: Option<usize>) -> KnowledgeResult<Vec<KnowledgeHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit.unwrap_or(self.settings.search.max_results).max(1);
        let search = &self.settings.search;

        let ranked = match self.settings.search_type {
            SearchType::Keyword => {
                let hits = bm25_search(self.pool(), self.collection(), query, limit).await?;
                hits.into_iter().map(|(id, score)| (id, -score)).collect()
            }
            SearchType::Vector => {
                let embedding = self.embed_query(query).await?;
                let hits = dense_search(self.pool(), self.collection(), &embedding, limit).await?;
                hits.into_iter()
                    .map(|(id, distance)| (id, 1.0 / (1.0 + distance)))
                    .collect()
            }
            SearchType::Hybrid => {
                let bm25 =
                    bm25_search(self.pool(), self.collection(), query, search.bm25_limit).await?;
                let embedding = self.embed_query(query).await?;
                let dense =
                    dense_search(self.pool(), self.collection(), &embedding, search.dense_limit)
                        .await?;
                rank_fused(rrf_fuse(search.rrf_k, &bm25, &dense), limit)
            }
        };

        hydrate_hits(self.pool(), &ranked).await
    }

    async fn embed_query(&self, query: &str) -> KnowledgeResult<Vec<f32>> {
        let mut vectors = self
            .embedder
            .embed_batch(&[query.to_string()], EmbeddingTask::Query)
            .await?;
        vectors
            .pop()
            .ok_or_else(|| KnowledgeError::Embedding("no embedding returned for query".to_string()))
    }

    pub async fn stats(&self) -> KnowledgeResult<KnowledgeStats> {
        let documents = storage::list_documents(self.pool(), self.collection()).await?;
        let chunks = storage::count_chunks(self.pool(), self.collection()).await?;
        Ok(KnowledgeStats {
            documents: documents.len(),
            chunks: chunks.max(0) as usize,
        })
    }
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
