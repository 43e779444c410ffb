//! assist-knowledge: URL knowledge base with keyword, vector and hybrid search.

pub mod chunker;
pub mod embeddings;
pub mod errors;
pub mod fetch;
pub mod knowledge;
pub mod search;
pub mod storage;

pub use embeddings::{Embedder, EmbeddingTask, GeminiEmbedder};
pub use errors::{KnowledgeError, KnowledgeResult};
pub use fetch::FetchedPage;
pub use knowledge::{IngestOutcome, KnowledgeStats, LoadReport, SourceFailure, UrlKnowledge};
pub use search::KnowledgeHit;
