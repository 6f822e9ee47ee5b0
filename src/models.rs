//! Core data models used throughout the answer engine.
//!
//! These types represent the documents, chunks, embeddings and retrieval
//! artefacts that flow through ingestion and the per-query pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Raw text produced by a source reader before normalization.
#[derive(Debug, Clone)]
pub struct SourceText {
    /// Path relative to the knowledge root (or as given for single files).
    pub source_path: String,
    pub content_type: String,
    pub text: String,
}

/// A normalized, immutable document. Re-ingestion creates a new version.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    /// Content-derived: SHA-256 over `source_path` and `raw_text`.
    pub id: String,
    pub source_path: String,
    pub content_type: String,
    pub raw_text: String,
    pub version: u32,
    pub ingested_at: DateTime<Utc>,
}

/// A bounded slice of a document's text; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub source_path: String,
    /// Position within the owning document, contiguous from 0.
    pub ordinal: usize,
    /// Offset of the first character within the document text, in chars.
    pub start_char: usize,
    pub text: String,
    pub token_count: usize,
    /// SHA-256 of `text`, used for context deduplication.
    pub hash: String,
}

/// A chunk's vector under one embedding model.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub model_id: String,
    pub created_at: DateTime<Utc>,
}

/// One retrieval hit.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Arc<Chunk>,
    pub score: f32,
}

/// Hits ordered by descending score, at most `top_k` long.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn new(hits: Vec<ScoredChunk>) -> Self {
        Self { hits }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredChunk> {
        self.hits.iter()
    }

    /// Mean similarity of the hits, `0.0` when empty.
    pub fn mean_score(&self) -> f32 {
        if self.hits.is_empty() {
            return 0.0;
        }
        self.hits.iter().map(|h| h.score).sum::<f32>() / self.hits.len() as f32
    }
}

/// Provenance for one chunk placed in the prompt context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    /// Marker as it appears in the context, e.g. `S1`.
    pub marker: String,
    pub chunk_id: String,
    pub document_id: String,
    pub source_path: String,
    pub ordinal: usize,
    pub score: f32,
}

/// Context text handed to the generator together with its citations.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssembledContext {
    pub text: String,
    pub citations: Vec<Citation>,
    pub token_estimate: usize,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }
}

/// How an answer came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// Generated from retrieved context.
    Grounded,
    /// Generated from the bare question; the model was told no context exists.
    WithoutContext,
    /// Deterministic fallback: nothing relevant was retrieved.
    NoContext,
    /// Deterministic fallback: a boundary stayed unavailable after retries.
    Unavailable,
}

impl AnswerOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self, AnswerOutcome::NoContext | AnswerOutcome::Unavailable)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedAnswer {
    pub answer_text: String,
    /// Best-effort: citations whose marker or source appears in the answer.
    pub citations_used: Vec<Citation>,
    pub outcome: AnswerOutcome,
}

/// The full trace of one question. Ephemeral; never persisted by the engine.
#[derive(Debug, Clone, Serialize)]
pub struct AnsweredQuery {
    pub id: String,
    pub query_text: String,
    pub retrieval_results: RetrievalResult,
    pub assembled_context: AssembledContext,
    pub generated_answer: GeneratedAnswer,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}
