//! Error taxonomy for the answer engine.
//!
//! Every library boundary returns [`RagError`]. Variants map one-to-one to
//! the operational categories the engine distinguishes:
//!
//! | Variant | Meaning | Transient |
//! |---------|---------|-----------|
//! | [`Ingest`](RagError::Ingest) | Bad source document | no |
//! | [`EmbeddingUnavailable`](RagError::EmbeddingUnavailable) | Embedding boundary outage | when flagged |
//! | [`GenerationUnavailable`](RagError::GenerationUnavailable) | Generation boundary outage | when flagged |
//! | [`EmptyKnowledgeBase`](RagError::EmptyKnowledgeBase) | Nothing has been ingested | no |
//! | [`IndexCorruption`](RagError::IndexCorruption) | Dimension or model mismatch | no |
//! | [`Storage`](RagError::Storage) | SQLite persistence failure | no |
//!
//! Only transient errors are retried by [`crate::retry`].

use std::time::Duration;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("ingest failed for {source_path}: {reason}")]
    Ingest { source_path: String, reason: String },

    #[error("embedding boundary unavailable: {reason}")]
    EmbeddingUnavailable { reason: String, retryable: bool },

    #[error("generation boundary unavailable: {reason}")]
    GenerationUnavailable { reason: String, retryable: bool },

    #[error("knowledge base is empty: no chunks have been ingested")]
    EmptyKnowledgeBase,

    #[error("index corruption: {details}")]
    IndexCorruption { details: String },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RagError {
    pub fn ingest(source_path: impl Into<String>, reason: impl Into<String>) -> Self {
        RagError::Ingest {
            source_path: source_path.into(),
            reason: reason.into(),
        }
    }

    pub fn embedding(reason: impl Into<String>, retryable: bool) -> Self {
        RagError::EmbeddingUnavailable {
            reason: reason.into(),
            retryable,
        }
    }

    pub fn generation(reason: impl Into<String>, retryable: bool) -> Self {
        RagError::GenerationUnavailable {
            reason: reason.into(),
            retryable,
        }
    }

    pub fn corruption(details: impl Into<String>) -> Self {
        RagError::IndexCorruption {
            details: details.into(),
        }
    }

    /// A boundary call that ran out of time. Timeouts are always retryable.
    pub fn timed_out(boundary: Boundary, after: Duration) -> Self {
        let reason = format!("timed out after {} ms", after.as_millis());
        match boundary {
            Boundary::Embedding => RagError::embedding(reason, true),
            Boundary::Generation => RagError::generation(reason, true),
        }
    }

    /// Whether a retry with identical input may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RagError::EmbeddingUnavailable { retryable, .. }
            | RagError::GenerationUnavailable { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Stable machine-readable code, used by the HTTP error contract.
    pub fn code(&self) -> &'static str {
        match self {
            RagError::Ingest { .. } => "ingest_error",
            RagError::EmbeddingUnavailable { .. } => "embedding_unavailable",
            RagError::GenerationUnavailable { .. } => "generation_unavailable",
            RagError::EmptyKnowledgeBase => "empty_knowledge_base",
            RagError::IndexCorruption { .. } => "index_corruption",
            RagError::Storage(_) => "storage",
            RagError::Config(_) => "bad_config",
        }
    }
}

/// The two external boundaries the engine calls across the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Embedding,
    Generation,
}

impl std::fmt::Display for Boundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Boundary::Embedding => write!(f, "embedding"),
            Boundary::Generation => write!(f, "generation"),
        }
    }
}
