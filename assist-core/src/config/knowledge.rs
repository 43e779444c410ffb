//! Knowledge base configuration types.
//!
//! These settings describe where the knowledge index lives, which sources
//! feed it and how it is searched. They are consumed by `assist-knowledge`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// How the knowledge index is queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchType {
    /// Dense embedding similarity only.
    Vector,
    /// BM25 full-text ranking only.
    Keyword,
    /// Both rankings fused with reciprocal-rank fusion.
    #[default]
    Hybrid,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Vector => "vector",
            SearchType::Keyword => "keyword",
            SearchType::Hybrid => "hybrid",
        }
    }

    pub fn uses_embeddings(&self) -> bool {
        matches!(self, SearchType::Vector | SearchType::Hybrid)
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vector" => Ok(SearchType::Vector),
            "keyword" | "fts" | "bm25" => Ok(SearchType::Keyword),
            "hybrid" => Ok(SearchType::Hybrid),
            other => Err(format!("Unknown search type: {}", other)),
        }
    }
}

impl<'de> Deserialize<'de> for SearchType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for SearchType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Knowledge base settings (`[knowledge]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSettings {
    /// Source URLs to ingest. Every entry must be an absolute http(s) URL.
    #[serde(default)]
    pub urls: Vec<String>,
    /// Collection name inside the knowledge database.
    #[serde(default = "default_knowledge_table")]
    pub table_name: String,
    /// Index database file, relative to the scratch directory.
    #[serde(default = "default_knowledge_db_file")]
    pub db_file: String,
    #[serde(default)]
    pub search_type: SearchType,
    /// Gemini embedding model id.
    #[serde(default = "default_embedder_id")]
    pub embedder_id: String,
    /// Override for the embedding API base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedder_base_url: Option<String>,
    #[serde(default = "default_embedding_batch")]
    pub embedding_batch: usize,
    /// Ingest the sources before the server starts.
    #[serde(default)]
    pub load_on_startup: bool,
    /// Drop the collection before ingesting.
    #[serde(default)]
    pub recreate: bool,
    #[serde(default = "default_fetch_timeout_seconds")]
    pub fetch_timeout_seconds: u64,
    #[serde(default)]
    pub search: SearchDefaults,
}

impl Default for KnowledgeSettings {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            table_name: default_knowledge_table(),
            db_file: default_knowledge_db_file(),
            search_type: SearchType::default(),
            embedder_id: default_embedder_id(),
            embedder_base_url: None,
            embedding_batch: default_embedding_batch(),
            load_on_startup: false,
            recreate: false,
            fetch_timeout_seconds: default_fetch_timeout_seconds(),
            search: SearchDefaults::default(),
        }
    }
}

/// Search tuning knobs (`[knowledge.search]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchDefaults {
    #[serde(default = "default_rrf_k")]
    pub rrf_k: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_bm25_limit")]
    pub bm25_limit: usize,
    #[serde(default = "default_dense_limit")]
    pub dense_limit: usize,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            max_results: default_max_results(),
            bm25_limit: default_bm25_limit(),
            dense_limit: default_dense_limit(),
        }
    }
}

fn default_knowledge_table() -> String {
    "assist_knowledge".to_string()
}

fn default_knowledge_db_file() -> String {
    "knowledge.sqlite3".to_string()
}

fn default_embedder_id() -> String {
    "gemini-embedding-exp-03-07".to_string()
}

fn default_embedding_batch() -> usize {
    32
}

fn default_fetch_timeout_seconds() -> u64 {
    30
}

fn default_rrf_k() -> usize {
    60
}

fn default_max_results() -> usize {
    5
}

fn default_bm25_limit() -> usize {
    20
}

fn default_dense_limit() -> usize {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_type_parses_aliases() {
        assert_eq!("hybrid".parse::<SearchType>().unwrap(), SearchType::Hybrid);
        assert_eq!("Vector".parse::<SearchType>().unwrap(), SearchType::Vector);
        assert_eq!("bm25".parse::<SearchType>().unwrap(), SearchType::Keyword);
        assert!("semantic".parse::<SearchType>().is_err());
    }

    #[test]
    fn knowledge_defaults_have_no_sources() {
        let settings = KnowledgeSettings::default();
        assert!(settings.urls.is_empty());
        assert_eq!(settings.search_type, SearchType::Hybrid);
        assert_eq!(settings.embedder_id, "gemini-embedding-exp-03-07");
        assert!(settings.search_type.uses_embeddings());
    }
}
