//! Storage abstraction for the knowledge base.
//!
//! The [`Store`] trait holds the durable copy of documents, chunks and
//! embeddings. The vector index is always rebuilt from it, never the other
//! way round, so the store is the source of truth across restarts.
//!
//! Two backends:
//! - [`SqliteStore`] — sqlx over a WAL-mode SQLite file.
//! - [`MemoryStore`] — `HashMap`s behind a lock, for tests and throwaway runs.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`document_by_source`](Store::document_by_source) | Current version of a source, if any |
//! | [`replace_document`](Store::replace_document) | Swap a source's document, chunks and embeddings in one transaction |
//! | [`remove_source`](Store::remove_source) | Delete a source and everything it owns |
//! | [`list_sources`](Store::list_sources) | All sources with their document IDs |
//! | [`load_entries`](Store::load_entries) | Every chunk with its stored embedding, for index rebuilds |
//! | [`replace_embeddings`](Store::replace_embeddings) | Persist a full re-embed |
//! | [`stats`](Store::stats) | Counts for `status` |

mod memory;
mod sqlite;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::models::{Chunk, Document, Embedding};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Lightweight view of a stored document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRecord {
    pub source_path: String,
    pub document_id: String,
    pub version: u32,
    pub chunk_count: usize,
}

/// A stored chunk and, when present, its embedding.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub chunk: Chunk,
    pub embedding: Option<Embedding>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub documents: usize,
    pub chunks: usize,
    pub embeddings: usize,
    /// Distinct embedding models present, sorted.
    pub model_ids: Vec<String>,
}

/// Durable storage backend.
///
/// Every mutating method is all-or-nothing: on error the previous state is
/// left untouched.
#[async_trait]
pub trait Store: Send + Sync {
    async fn document_by_source(&self, source_path: &str) -> Result<Option<SourceRecord>>;

    /// Replace whatever is stored for `document.source_path` with
    /// `document`, its `chunks` and their `embeddings`.
    async fn replace_document(
        &self,
        document: &Document,
        chunks: &[Chunk],
        embeddings: &[Embedding],
    ) -> Result<()>;

    /// Returns the removed document's ID, or `None` if the source was unknown.
    async fn remove_source(&self, source_path: &str) -> Result<Option<String>>;

    /// Sorted by `source_path`.
    async fn list_sources(&self) -> Result<Vec<SourceRecord>>;

    /// Sorted by `(source_path, ordinal)`.
    async fn load_entries(&self) -> Result<Vec<StoredEntry>>;

    /// Overwrite the embeddings of existing chunks. Unknown chunk IDs are ignored.
    async fn replace_embeddings(&self, embeddings: &[Embedding]) -> Result<()>;

    async fn stats(&self) -> Result<StoreStats>;
}
