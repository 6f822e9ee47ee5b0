//! Query-time retrieval: embed, search, filter, rank.
//!
//! The query is embedded once and searched against a single index snapshot
//! taken before the embedding call, so the whole retrieval sees one
//! consistent index version even if ingestion publishes a new one meanwhile.
//! The index is asked for `top_k * oversample_factor` candidates so that
//! similarity filtering and per-document deduplication can still fill
//! `top_k` slots.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::config::{EmptyIndexPolicy, RetrievalConfig};
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::models::{RetrievalResult, ScoredChunk};

/// Largest `top_k` a caller may request.
pub const MAX_TOP_K: usize = 100;

/// Per-call overrides; `None` falls back to configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetrieveOptions {
    pub top_k: Option<usize>,
    pub min_similarity: Option<f32>,
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>, config: RetrievalConfig) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve with configured `top_k` and `min_similarity`.
    pub async fn retrieve_default(&self, query: &str) -> Result<RetrievalResult> {
        self.retrieve_with(query, RetrieveOptions::default()).await
    }

    pub async fn retrieve_with(&self, query: &str, options: RetrieveOptions) -> Result<RetrievalResult> {
        self.retrieve(
            query,
            options.top_k.unwrap_or(self.config.top_k),
            options.min_similarity.unwrap_or(self.config.min_similarity),
        )
        .await
    }

    /// Up to `top_k` chunks scoring at least `min_similarity`, best first.
    ///
    /// An empty index yields an empty result, or
    /// [`RagError::EmptyKnowledgeBase`] under [`EmptyIndexPolicy::Error`].
    /// The embedder is not called in that case.
    pub async fn retrieve(&self, query: &str, top_k: usize, min_similarity: f32) -> Result<RetrievalResult> {
        let snapshot = self.index.snapshot();
        if snapshot.is_empty() {
            return match self.config.empty_index_policy {
                EmptyIndexPolicy::Empty => Ok(RetrievalResult::default()),
                EmptyIndexPolicy::Error => Err(RagError::EmptyKnowledgeBase),
            };
        }
        if query.trim().is_empty() || top_k == 0 {
            return Ok(RetrievalResult::default());
        }

        let query_vector = self.embedder.embed(query).await?;
        let candidates_k = top_k.saturating_mul(self.config.oversample_factor.max(1));
        let candidates = snapshot.search(&query_vector, candidates_k)?;
        let candidate_count = candidates.len();

        let result = select_hits(
            candidates.hits,
            top_k,
            min_similarity,
            self.config.one_chunk_per_document,
        );
        debug!(
            index_version = snapshot.version(),
            candidates = candidate_count,
            kept = result.len(),
            "retrieved"
        );
        Ok(result)
    }
}

/// Filter candidates that are already ordered best-first.
pub fn select_hits(
    candidates: Vec<ScoredChunk>,
    top_k: usize,
    min_similarity: f32,
    one_chunk_per_document: bool,
) -> RetrievalResult {
    let mut seen_documents = HashSet::new();
    let hits = candidates
        .into_iter()
        .filter(|hit| hit.score >= min_similarity)
        .filter(|hit| !one_chunk_per_document || seen_documents.insert(hit.chunk.document_id.clone()))
        .take(top_k)
        .collect();
    RetrievalResult::new(hits)
}
