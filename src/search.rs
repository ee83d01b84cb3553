//! Vector search: cosine ranking over stored chunk vectors with optional
//! keyword re-ranking, fronted by the retrieval cache.
use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex as TokioMutex;
use tracing::debug;

use crate::cache::RetrievalCache;
use crate::chunker::rules::keyword_set;
use crate::config::SearchConfig;
use crate::embedder::provider::EmbeddingProvider;
use crate::error::Result;
use crate::store::Db;
use crate::store::models::StoredChunk;

/// One ranked retrieval hit. Transient and query-scoped; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub chunk_id: i64,
    pub document_id: i64,
    pub document_title: String,
    pub source_path: String,
    pub content: String,
    /// Final ranking score: cosine similarity, blended with keyword overlap
    /// when re-ranking is enabled.
    pub similarity: f32,
    pub chunk_index: usize,
}

/// Which chunks a query may see.
#[derive(Debug, Clone)]
pub enum CandidateScope {
    All,
    Documents(Vec<i64>),
}

/// Cosine similarity of two vectors.
///
/// Returns 0 when either vector is empty, the dimensions differ, or either
/// norm is zero. Those cases never occur for correctly stored data; hitting
/// one indicates a data-integrity fault, and 0 keeps it out of the results.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Fraction of the query's keywords that appear in `content`.
fn keyword_overlap(query_keywords: &HashSet<String>, content: &str) -> f32 {
    if query_keywords.is_empty() {
        return 0.0;
    }
    let content_keywords = keyword_set(content);
    let hits = query_keywords.intersection(&content_keywords).count();
    hits as f32 / query_keywords.len() as f32
}

struct Ranked<'a> {
    chunk: &'a StoredChunk,
    score: f32,
}

/// Rank candidates against a query vector: threshold filter, top 2×top_k
/// similarity cut, optional keyword re-rank, truncate to top_k. Pure;
/// ordering is non-increasing by score and stable on ties.
fn rank_candidates<'a>(
    query_vector: &[f32],
    query_text: &str,
    candidates: &'a [StoredChunk],
    cfg: &SearchConfig,
) -> Vec<Ranked<'a>> {
    let mut ranked: Vec<Ranked<'a>> = candidates
        .iter()
        .map(|chunk| Ranked {
            chunk,
            score: cosine_similarity(query_vector, &chunk.embedding),
        })
        .filter(|r| r.score >= cfg.similarity_threshold)
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(2 * cfg.top_k);

    if cfg.use_keyword_reranking && !query_text.trim().is_empty() {
        let query_keywords = keyword_set(query_text);
        for r in &mut ranked {
            let overlap = keyword_overlap(&query_keywords, &r.chunk.content);
            r.score =
                r.score * (1.0 - cfg.keyword_weight) + overlap * cfg.keyword_weight;
        }
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    ranked.truncate(cfg.top_k);
    ranked
}

/// Retrieval front end: embeds the query, scans the chunk store, ranks, and
/// serves repeated queries from the cache.
pub struct RetrievalEngine {
    db: Arc<TokioMutex<Db>>,
    provider: Arc<EmbeddingProvider>,
    cache: Arc<RetrievalCache>,
}

impl RetrievalEngine {
    #[must_use]
    pub fn new(
        db: Arc<TokioMutex<Db>>,
        provider: Arc<EmbeddingProvider>,
        cache: Arc<RetrievalCache>,
    ) -> Self {
        Self {
            db,
            provider,
            cache,
        }
    }

    /// Retrieve the chunks most relevant to `query`.
    ///
    /// Degrades to an empty list on a blank query, a failed query embedding,
    /// an empty candidate set, or all candidates below the threshold. A
    /// retrieval running beside an in-progress ingestion sees only chunks
    /// already committed.
    pub async fn search(
        &self,
        query: &str,
        cfg: &SearchConfig,
        scope: &CandidateScope,
    ) -> Result<Vec<RetrievalResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        if let Some(hit) = self.cache.get(query) {
            debug!("Cache hit for query");
            return Ok(hit);
        }

        let Some(query_vector) = self.provider.embed(query).await? else {
            debug!("Query embedding unavailable, returning empty result");
            return Ok(Vec::new());
        };

        let candidates = {
            let db = self.db.lock().await;
            match scope {
                CandidateScope::All => db.get_all_chunks()?,
                CandidateScope::Documents(ids) => db.get_chunks_by_document_ids(ids)?,
            }
        };

        let ranked = rank_candidates(&query_vector, query, &candidates, cfg);
        if ranked.is_empty() {
            return Ok(Vec::new());
        }

        // Join display metadata for the survivors only
        let chunk_ids: Vec<i64> = ranked.iter().map(|r| r.chunk.id).collect();
        let displays = {
            let db = self.db.lock().await;
            db.get_chunks_with_document_titles(&chunk_ids)?
        };

        let results: Vec<RetrievalResult> = ranked
            .iter()
            .filter_map(|r| {
                let display = displays.iter().find(|d| d.chunk_id == r.chunk.id)?;
                Some(RetrievalResult {
                    chunk_id: r.chunk.id,
                    document_id: r.chunk.document_id,
                    document_title: display.document_title.clone(),
                    source_path: display.source_path.clone(),
                    content: r.chunk.content.clone(),
                    similarity: r.score,
                    chunk_index: r.chunk.chunk_index,
                })
            })
            .collect();

        self.cache.put(query, results.clone());
        Ok(results)
    }
}
