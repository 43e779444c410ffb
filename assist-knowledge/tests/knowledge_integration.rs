use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;

use assist_core::{KnowledgeSettings, SearchType};
use assist_knowledge::{
    Embedder, EmbeddingTask, FetchedPage, IngestOutcome, KnowledgeError, KnowledgeResult,
    UrlKnowledge,
};

/// Hashes words into a fixed number of buckets so that texts sharing
/// vocabulary end up close together.
struct BagOfWordsEmbedder {
    dim: usize,
    model: String,
    calls: AtomicUsize,
}

impl BagOfWordsEmbedder {
    fn new(dim: usize) -> Self {
        Self::named(dim, "bag-of-words")
    }

    fn named(dim: usize, model: &str) -> Self {
        Self {
            dim,
            model: model.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
        {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
                % self.dim;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for BagOfWordsEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_batch(
        &self,
        inputs: &[String],
        _task: EmbeddingTask,
    ) -> KnowledgeResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(inputs.iter().map(|input| self.embed(input)).collect())
    }
}

fn settings(search_type: SearchType, urls: &[&str]) -> KnowledgeSettings {
    KnowledgeSettings {
        urls: urls.iter().map(|u| u.to_string()).collect(),
        table_name: "test_knowledge".to_string(),
        search_type,
        ..Default::default()
    }
}

fn agents_page() -> FetchedPage {
    FetchedPage {
        url: "https://docs.example.com/agents".to_string(),
        title: "Agents".to_string(),
        content: "# Agents\n\nAn agent combines a model with tools, memory and knowledge. \
                  Agents can call tools to search the web or run python code.\n\n\
                  # Storage\n\nSessions are persisted in sqlite so an agent remembers \
                  previous conversations across restarts."
            .to_string(),
    }
}

fn audio_page() -> FetchedPage {
    FetchedPage {
        url: "https://docs.example.com/audio".to_string(),
        title: "Audio".to_string(),
        content: "# Speech\n\nThe speech toolkit converts text into spoken audio files \
                  using a voice identifier and an output format such as mp3."
            .to_string(),
    }
}

async fn open(
    dir: &TempDir,
    settings: KnowledgeSettings,
    embedder: Arc<BagOfWordsEmbedder>,
) -> UrlKnowledge {
    UrlKnowledge::open(settings, &dir.path().join("knowledge.sqlite3"), embedder)
        .await
        .expect("open knowledge")
}

#[tokio::test]
async fn blank_source_fails_before_any_fetch() {
    let dir = TempDir::new().expect("tempdir");
    let embedder = Arc::new(BagOfWordsEmbedder::new(16));
    let knowledge = open(
        &dir,
        settings(SearchType::Hybrid, &["https://docs.example.com/a", ""]),
        embedder.clone(),
    )
    .await;

    let err = knowledge.load(false).await.unwrap_err();
    match err {
        KnowledgeError::InvalidSource(source) => assert_eq!(source.index, 1),
        other => panic!("expected InvalidSource, got {other:?}"),
    }
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(knowledge.stats().await.unwrap().documents, 0);
}

#[tokio::test]
async fn non_http_source_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let knowledge = open(
        &dir,
        settings(SearchType::Keyword, &["ftp://docs.example.com/llms.txt"]),
        Arc::new(BagOfWordsEmbedder::new(16)),
    )
    .await;

    let err = knowledge.load(false).await.unwrap_err();
    assert!(matches!(err, KnowledgeError::InvalidSource(_)));
    assert!(err.to_string().contains("ftp://docs.example.com/llms.txt"));
}

#[tokio::test]
async fn empty_source_list_loads_nothing() {
    let dir = TempDir::new().expect("tempdir");
    let knowledge = open(
        &dir,
        settings(SearchType::Hybrid, &[]),
        Arc::new(BagOfWordsEmbedder::new(16)),
    )
    .await;

    let report = knowledge.load(false).await.unwrap();
    assert_eq!(report.sources, 0);
    assert_eq!(report.documents_indexed, 0);
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn unchanged_pages_are_skipped_unless_forced() {
    let dir = TempDir::new().expect("tempdir");
    let embedder = Arc::new(BagOfWordsEmbedder::new(16));
    let knowledge = open(&dir, settings(SearchType::Hybrid, &[]), embedder.clone()).await;

    let first = knowledge.ingest_page(&agents_page(), false).await.unwrap();
    assert!(matches!(first, IngestOutcome::Indexed { chunks } if chunks >= 1));
    let calls_after_first = embedder.calls.load(Ordering::SeqCst);

    let second = knowledge.ingest_page(&agents_page(), false).await.unwrap();
    assert_eq!(second, IngestOutcome::Unchanged);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_after_first);

    let forced = knowledge.ingest_page(&agents_page(), true).await.unwrap();
    assert!(matches!(forced, IngestOutcome::Indexed { .. }));

    let stats = knowledge.stats().await.unwrap();
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.chunks, first_chunks(first));
}

fn first_chunks(outcome: IngestOutcome) -> usize {
    match outcome {
        IngestOutcome::Indexed { chunks } => chunks,
        IngestOutcome::Unchanged => 0,
    }
}

#[tokio::test]
async fn keyword_search_skips_embeddings() {
    let dir = TempDir::new().expect("tempdir");
    let embedder = Arc::new(BagOfWordsEmbedder::new(16));
    let knowledge = open(&dir, settings(SearchType::Keyword, &[]), embedder.clone()).await;

    knowledge.ingest_page(&agents_page(), false).await.unwrap();
    knowledge.ingest_page(&audio_page(), false).await.unwrap();

    let hits = knowledge.search("speech voice", None).await.unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].source_url, "https://docs.example.com/audio");
    assert!(hits[0].score > 0.0);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn vector_search_ranks_closest_chunk_first() {
    let dir = TempDir::new().expect("tempdir");
    let knowledge = open(
        &dir,
        settings(SearchType::Vector, &[]),
        Arc::new(BagOfWordsEmbedder::new(32)),
    )
    .await;

    knowledge.ingest_page(&agents_page(), false).await.unwrap();
    knowledge.ingest_page(&audio_page(), false).await.unwrap();

    let hits = knowledge
        .search("speech toolkit spoken audio voice", Some(1))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "Audio");
    assert!(hits[0].score > 0.0 && hits[0].score <= 1.0);
}

#[tokio::test]
async fn hybrid_search_fuses_both_rankings() {
    let dir = TempDir::new().expect("tempdir");
    let knowledge = open(
        &dir,
        settings(SearchType::Hybrid, &[]),
        Arc::new(BagOfWordsEmbedder::new(32)),
    )
    .await;

    knowledge.ingest_page(&agents_page(), false).await.unwrap();
    knowledge.ingest_page(&audio_page(), false).await.unwrap();

    let hits = knowledge.search("sessions persisted sqlite", Some(3)).await.unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].source_url, "https://docs.example.com/agents");
    assert!(hits.len() <= 3);
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn blank_query_returns_nothing() {
    let dir = TempDir::new().expect("tempdir");
    let knowledge = open(
        &dir,
        settings(SearchType::Hybrid, &[]),
        Arc::new(BagOfWordsEmbedder::new(16)),
    )
    .await;
    knowledge.ingest_page(&agents_page(), false).await.unwrap();

    assert!(knowledge.search("   ", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn recreate_clears_the_collection() {
    let dir = TempDir::new().expect("tempdir");
    let knowledge = open(
        &dir,
        settings(SearchType::Hybrid, &[]),
        Arc::new(BagOfWordsEmbedder::new(16)),
    )
    .await;
    knowledge.ingest_page(&agents_page(), false).await.unwrap();
    assert_eq!(knowledge.stats().await.unwrap().documents, 1);

    knowledge.load(true).await.unwrap();

    let stats = knowledge.stats().await.unwrap();
    assert_eq!(stats.documents, 0);
    assert_eq!(stats.chunks, 0);
    assert!(knowledge.search("agent tools", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn collections_share_a_file_without_mixing() {
    let dir = TempDir::new().expect("tempdir");
    let embedder = Arc::new(BagOfWordsEmbedder::new(16));

    let docs = open(&dir, settings(SearchType::Keyword, &[]), embedder.clone()).await;
    let other = open(
        &dir,
        KnowledgeSettings {
            table_name: "other_knowledge".to_string(),
            ..settings(SearchType::Keyword, &[])
        },
        embedder,
    )
    .await;

    docs.ingest_page(&agents_page(), false).await.unwrap();

    assert!(!docs.search("agent", None).await.unwrap().is_empty());
    assert!(other.search("agent", None).await.unwrap().is_empty());
    assert_eq!(other.stats().await.unwrap().documents, 0);
}

#[tokio::test]
async fn embedding_dimension_is_pinned() {
    let dir = TempDir::new().expect("tempdir");
    let first = open(
        &dir,
        settings(SearchType::Vector, &[]),
        Arc::new(BagOfWordsEmbedder::new(16)),
    )
    .await;
    first.ingest_page(&agents_page(), false).await.unwrap();
    drop(first);

    let second = open(
        &dir,
        settings(SearchType::Vector, &[]),
        Arc::new(BagOfWordsEmbedder::new(8)),
    )
    .await;
    let err = second.ingest_page(&audio_page(), false).await.unwrap_err();
    assert!(matches!(
        err,
        KnowledgeError::EmbeddingDimMismatch {
            expected: 16,
            actual: 8
        }
    ));
}

fn agent_pages(count: usize) -> Vec<FetchedPage> {
    (0..count)
        .map(|i| FetchedPage {
            url: format!("https://other.example.com/agents/{i}"),
            title: format!("Agents {i}"),
            content: format!(
                "# Agent {i}\n\nAn agent uses tools, memory and knowledge. \
                 Agent tools read knowledge and agent memory keeps context {i}."
            ),
        })
        .collect()
}

#[tokio::test]
async fn dense_search_stays_inside_its_collection() {
    for search_type in [SearchType::Vector, SearchType::Hybrid] {
        let dir = TempDir::new().expect("tempdir");
        let embedder = Arc::new(BagOfWordsEmbedder::new(16));

        let docs = open(&dir, settings(search_type, &[]), embedder.clone()).await;
        let other = open(
            &dir,
            KnowledgeSettings {
                table_name: "other_knowledge".to_string(),
                ..settings(search_type, &[])
            },
            embedder,
        )
        .await;

        docs.ingest_page(&audio_page(), false).await.unwrap();
        for page in agent_pages(10) {
            other.ingest_page(&page, false).await.unwrap();
        }

        // Every other_knowledge chunk is closer to the query than the audio chunk.
        let hits = docs
            .search("agent tools memory knowledge", Some(1))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1, "{search_type:?} lost its own vector hit");
        assert_eq!(hits[0].source_url, "https://docs.example.com/audio");

        let other_hits = other.search("agent tools memory knowledge", Some(3)).await.unwrap();
        assert!(
            other_hits
                .iter()
                .all(|hit| hit.source_url.starts_with("https://other.example.com/"))
        );
    }
}

#[tokio::test]
async fn keyword_index_is_embedded_when_switching_to_vectors() {
    let dir = TempDir::new().expect("tempdir");
    let keyword = open(
        &dir,
        settings(SearchType::Keyword, &[]),
        Arc::new(BagOfWordsEmbedder::new(16)),
    )
    .await;
    keyword.ingest_page(&audio_page(), false).await.unwrap();
    drop(keyword);

    let embedder = Arc::new(BagOfWordsEmbedder::new(16));
    let vector = open(&dir, settings(SearchType::Vector, &[]), embedder.clone()).await;
    let outcome = vector.ingest_page(&audio_page(), false).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Indexed { .. }));
    assert!(embedder.calls.load(Ordering::SeqCst) > 0);

    let hits = vector.search("speech audio voice", Some(1)).await.unwrap();
    assert_eq!(hits.len(), 1);

    let again = vector.ingest_page(&audio_page(), false).await.unwrap();
    assert_eq!(again, IngestOutcome::Unchanged);
}

#[tokio::test]
async fn new_embedder_model_reembeds_unchanged_pages() {
    let dir = TempDir::new().expect("tempdir");
    let first = open(
        &dir,
        settings(SearchType::Hybrid, &[]),
        Arc::new(BagOfWordsEmbedder::named(16, "bag-of-words-v1")),
    )
    .await;
    first.ingest_page(&agents_page(), false).await.unwrap();
    drop(first);

    let embedder = Arc::new(BagOfWordsEmbedder::named(16, "bag-of-words-v2"));
    let second = open(&dir, settings(SearchType::Hybrid, &[]), embedder.clone()).await;
    let outcome = second.ingest_page(&agents_page(), false).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Indexed { .. }));
    assert_eq!(
        second.ingest_page(&agents_page(), false).await.unwrap(),
        IngestOutcome::Unchanged
    );

    // Keyword mode never needs vectors, so the switch back is a no-op.
    drop(second);
    let keyword = open(
        &dir,
        settings(SearchType::Keyword, &[]),
        Arc::new(BagOfWordsEmbedder::new(16)),
    )
    .await;
    assert_eq!(
        keyword.ingest_page(&agents_page(), false).await.unwrap(),
        IngestOutcome::Unchanged
    );
}

#[tokio::test]
async fn failed_write_leaves_the_previous_version_indexed() {
    let dir = TempDir::new().expect("tempdir");
    let db_path = dir.path().join("knowledge.sqlite3");
    let knowledge = open(
        &dir,
        settings(SearchType::Keyword, &[]),
        Arc::new(BagOfWordsEmbedder::new(16)),
    )
    .await;
    knowledge.ingest_page(&agents_page(), false).await.unwrap();

    let guard = sqlx::SqlitePool::connect(&format!("sqlite://{}", db_path.display()))
        .await
        .unwrap();
    sqlx::query(
        "CREATE TRIGGER reject_chunk BEFORE INSERT ON chunks
         WHEN NEW.content LIKE '%rewritten%'
         BEGIN SELECT RAISE(ABORT, 'rejected'); END",
    )
    .execute(&guard)
    .await
    .unwrap();

    let rewritten = FetchedPage {
        content: "# Agents\n\nThis page was rewritten with new content.".to_string(),
        ..agents_page()
    };
    assert!(knowledge.ingest_page(&rewritten, false).await.is_err());

    // The old hash and chunks survived the failed write.
    assert_eq!(
        knowledge.ingest_page(&agents_page(), false).await.unwrap(),
        IngestOutcome::Unchanged
    );
    assert!(!knowledge.search("sessions sqlite", None).await.unwrap().is_empty());

    sqlx::query("DROP TRIGGER reject_chunk")
        .execute(&guard)
        .await
        .unwrap();
    assert!(matches!(
        knowledge.ingest_page(&rewritten, false).await.unwrap(),
        IngestOutcome::Indexed { .. }
    ));
}
