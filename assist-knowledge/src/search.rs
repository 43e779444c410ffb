use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::errors::KnowledgeResult;

/// A chunk returned by a knowledge search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeHit {
    pub document_id: i64,
    pub source_url: String,
    pub title: String,
    pub chunk_title: String,
    pub content: String,
    pub score: f32,
}

/// Turn free text into an FTS5 query of quoted terms joined with OR.
///
/// Returns `None` when the text has no searchable terms.
pub fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|term| !term.is_empty())
        .map(|term| format!("\"{}\"", term.to_lowercase()))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// BM25-ranked chunk ids with their raw (negative, lower is better) scores.
pub(crate) async fn bm25_search(
    pool: &SqlitePool,
    collection: &str,
    query: &str,
    limit: usize,
) -> KnowledgeResult<Vec<(i64, f32)>> {
    let Some(match_expr) = fts_query(query) else {
        return Ok(Vec::new());
    };

    let rows = sqlx::query_as::<_, (i64, f32)>(
        r#"SELECT chunk_id, bm25(chunk_fts) as score
           FROM chunk_fts
           WHERE chunk_fts MATCH ? AND collection = ?
           ORDER BY score ASC
           LIMIT ?"#,
    )
    .bind(match_expr)
    .bind(collection)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Nearest chunk ids with their vector distances (lower is closer).
pub(crate) async fn dense_search(
    pool: &SqlitePool,
    collection: &str,
    embedding: &[f32],
    limit: usize,
) -> KnowledgeResult<Vec<(i64, f32)>> {
    let table: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'chunk_vec'",
    )
    .fetch_optional(pool)
    .await?;
    if table.is_none() {
        return Ok(Vec::new());
    }

    let payload = serde_json::to_string(embedding).map_err(|e| {
        crate::errors::KnowledgeError::Embedding(format!("embedding serialize failed: {e}"))
    })?;

    // vec0 takes the neighbour count as a `k` constraint; the partition
    // column keeps the scan inside this collection.
    let rows = sqlx::query_as::<_, (i64, f32)>(
        r#"SELECT rowid, distance
           FROM chunk_vec
           WHERE embedding MATCH ? AND k = ? AND collection = ?
           ORDER BY distance ASC"#,
    )
    .bind(payload)
    .bind(limit.max(1) as i64)
    .bind(collection)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub(crate) fn rrf_fuse(k: usize, a: &[(i64, f32)], b: &[(i64, f32)]) -> HashMap<i64, f32> {
    let mut scores: HashMap<i64, f32> = HashMap::new();

    for list in [a, b] {
        for (idx, (chunk_id, _)) in list.iter().enumerate() {
            let rank = idx + 1;
            let score = 1.0 / (k as f32 + rank as f32);
            *scores.entry(*chunk_id).or_insert(0.0) += score;
        }
    }

    scores
}

/// Sort fused scores best first, breaking ties by chunk id for stable output.
pub(crate) fn rank_fused(scores: HashMap<i64, f32>, limit: usize) -> Vec<(i64, f32)> {
    let mut ranked: Vec<(i64, f32)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    ranked.truncate(limit);
    ranked
}

#[derive(Debug, sqlx::FromRow)]
struct HitRow {
    chunk_id: i64,
    document_id: i64,
    source_url: String,
    title: String,
    chunk_title: String,
    content: String,
}

/// Load chunk and document fields for ranked ids, keeping the ranking order.
pub(crate) async fn hydrate_hits(
    pool: &SqlitePool,
    ranked: &[(i64, f32)],
) -> KnowledgeResult<Vec<KnowledgeHit>> {
    if ranked.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = ranked.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let sql = format!(
        r#"SELECT c.id AS chunk_id, c.document_id, d.source_url, d.title, c.title AS chunk_title, c.content
           FROM chunks c
           JOIN documents d ON d.id = c.document_id
           WHERE c.id IN ({})"#,
        placeholders
    );
    let mut query = sqlx::query_as::<_, HitRow>(&sql);
    for (chunk_id, _) in ranked {
        query = query.bind(chunk_id);
    }
    let rows = query.fetch_all(pool).await?;
    let mut by_id: HashMap<i64, HitRow> = rows.into_iter().map(|r| (r.chunk_id, r)).collect();

    Ok(ranked
        .iter()
        .filter_map(|(chunk_id, score)| {
            by_id.remove(chunk_id).map(|row| KnowledgeHit {
                document_id: row.document_id,
                source_url: row.source_url,
                title: row.title,
                chunk_title: row.chunk_title,
                content: row.content,
                score: *score,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fts_query_quotes_terms() {
        assert_eq!(
            fts_query("agent.run() vs print_response?").as_deref(),
            Some("\"agent\" OR \"run\" OR \"vs\" OR \"print_response\"")
        );
        assert_eq!(fts_query("  ?!  "), None);
    }

    #[test]
    fn rrf_rewards_agreement() {
        let bm25 = vec![(1, -3.0), (2, -2.0), (3, -1.0)];
        let dense = vec![(2, 0.1), (4, 0.2)];
        let fused = rrf_fuse(60, &bm25, &dense);
        let ranked = rank_fused(fused, 10);

        assert_eq!(ranked[0].0, 2);
        assert_eq!(ranked.len(), 4);
        let expected = 1.0 / 62.0 + 1.0 / 61.0;
        assert!((ranked[0].1 - expected).abs() < 1e-6);
    }

    #[test]
    fn rank_fused_truncates_and_is_stable() {
        let fused = rrf_fuse(60, &[(7, 0.0)], &[(5, 0.0)]);
        let ranked = rank_fused(fused, 1);
        assert_eq!(ranked, vec![(5, 1.0 / 61.0)]);
    }
}
