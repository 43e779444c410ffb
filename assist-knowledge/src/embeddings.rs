use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{KnowledgeError, KnowledgeResult};

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Whether text is being stored or used to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
    Document,
    Query,
}

impl EmbeddingTask {
    fn as_gemini(&self) -> &'static str {
        match self {
            EmbeddingTask::Document => "RETRIEVAL_DOCUMENT",
            EmbeddingTask::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// Turns text into dense vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded next to stored vectors.
    fn model(&self) -> &str;

    /// One vector per input, in input order.
    async fn embed_batch(
        &self,
        inputs: &[String],
        task: EmbeddingTask,
    ) -> KnowledgeResult<Vec<Vec<f32>>>;
}

/// Gemini `batchEmbedContents` client.
#[derive(Clone)]
pub struct GeminiEmbedder {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiEmbedder")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiEmbedder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> KnowledgeResult<Self> {
        Self::with_timeout(api_key, model, DEFAULT_TIMEOUT)
    }

    /// Like [`new`](Self::new), failing requests that take longer than `timeout`.
    pub fn with_timeout(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> KnowledgeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KnowledgeError::Embedding(format!("reqwest client: {e}")))?;
        Ok(Self {
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            model: model.into(),
            api_key: api_key.into(),
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn model_path(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_batch(
        &self,
        inputs: &[String],
        task: EmbeddingTask,
    ) -> KnowledgeResult<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let model_path = self.model_path();
        let url = format!("{}/{}:batchEmbedContents", self.base_url, model_path);
        let body = BatchEmbedRequest {
            requests: inputs
                .iter()
                .map(|text| EmbedContentRequest {
                    model: model_path.clone(),
                    content: Content {
                        parts: vec![Part { text: text.clone() }],
                    },
                    task_type: task.as_gemini(),
                })
                .collect(),
        };

        // The key travels in a header so it never shows up in logged URLs.
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(KnowledgeError::Embedding(format!(
                "embedding request failed: {status} {text}"
            )));
        }

        let payload: BatchEmbedResponse = response.json().await?;
        let vectors: Vec<Vec<f32>> = payload.embeddings.into_iter().map(|e| e.values).collect();

        if vectors.len() != inputs.len() {
            return Err(KnowledgeError::Embedding(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                vectors.len()
            )));
        }

        Ok(vectors)
    }
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest {
    model: String,
    content: Content,
    task_type: &'static str,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}
