//! In-memory [`Store`] implementation for tests and ephemeral runs.
//!
//! All state sits behind one `tokio::sync::RwLock`, so each mutation is
//! atomic with respect to readers.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::{Chunk, Document, Embedding};

use super::{SourceRecord, Store, StoreStats, StoredEntry};

#[derive(Default)]
struct State {
    /// Keyed by source path; sorted iteration for free.
    documents: BTreeMap<String, Document>,
    chunks: HashMap<String, Vec<Chunk>>,
    embeddings: HashMap<String, Embedding>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl State {
    fn drop_document(&mut self, document_id: &str) {
        if let Some(chunks) = self.chunks.remove(document_id) {
            for c in chunks {
                self.embeddings.remove(&c.id);
            }
        }
    }

    fn record(&self, doc: &Document) -> SourceRecord {
        SourceRecord {
            source_path: doc.source_path.clone(),
            document_id: doc.id.clone(),
            version: doc.version,
            chunk_count: self.chunks.get(&doc.id).map_or(0, Vec::len),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn document_by_source(&self, source_path: &str) -> Result<Option<SourceRecord>> {
        let state = self.state.read().await;
        Ok(state.documents.get(source_path).map(|d| state.record(d)))
    }

    async fn replace_document(
        &self,
        document: &Document,
        chunks: &[Chunk],
        embeddings: &[Embedding],
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(previous) = state.documents.remove(&document.source_path) {
            state.drop_document(&previous.id);
        }
        state
            .documents
            .insert(document.source_path.clone(), document.clone());
        state.chunks.insert(document.id.clone(), chunks.to_vec());
        for e in embeddings {
            state.embeddings.insert(e.chunk_id.clone(), e.clone());
        }
        Ok(())
    }

    async fn remove_source(&self, source_path: &str) -> Result<Option<String>> {
        let mut state = self.state.write().await;
        let Some(doc) = state.documents.remove(source_path) else {
            return Ok(None);
        };
        state.drop_document(&doc.id);
        Ok(Some(doc.id))
    }

    async fn list_sources(&self) -> Result<Vec<SourceRecord>> {
        let state = self.state.read().await;
        Ok(state.documents.values().map(|d| state.record(d)).collect())
    }

    async fn load_entries(&self) -> Result<Vec<StoredEntry>> {
        let state = self.state.read().await;
        let mut entries = Vec::new();
        for doc in state.documents.values() {
            for chunk in state.chunks.get(&doc.id).into_iter().flatten() {
                entries.push(StoredEntry {
                    chunk: chunk.clone(),
                    embedding: state.embeddings.get(&chunk.id).cloned(),
                });
            }
        }
        Ok(entries)
    }

    async fn replace_embeddings(&self, embeddings: &[Embedding]) -> Result<()> {
        let mut state = self.state.write().await;
        let known: std::collections::HashSet<String> = state
            .chunks
            .values()
            .flatten()
            .map(|c| c.id.clone())
            .collect();
        for e in embeddings {
            if known.contains(&e.chunk_id) {
                state.embeddings.insert(e.chunk_id.clone(), e.clone());
            }
        }
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let state = self.state.read().await;
        let mut model_ids: Vec<String> = state
            .embeddings
            .values()
            .map(|e| e.model_id.clone())
            .collect();
        model_ids.sort();
        model_ids.dedup();
        Ok(StoreStats {
            documents: state.documents.len(),
            chunks: state.chunks.values().map(Vec::len).sum(),
            embeddings: state.embeddings.len(),
            model_ids,
        })
    }
}
