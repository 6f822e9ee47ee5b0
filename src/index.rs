//! Versioned in-memory vector index.
//!
//! The index is a sequence of immutable [`IndexSnapshot`]s. Readers grab
//! the current snapshot (an `Arc` clone under a briefly held read lock) and
//! search it without any further locking, so a search never observes a
//! partially written vector. Writers are serialized by a mutex, build the
//! next snapshot off to the side (copy-on-write; entries are shared through
//! `Arc`, only the bookkeeping is copied) and publish it with a single
//! pointer swap. A failed mutation leaves the published snapshot untouched.
//!
//! # Similarity
//!
//! Vectors are L2-normalized when inserted and queries are normalized
//! before scoring, so the inner product equals cosine similarity. Ties on
//! equal score are broken by lower chunk ordinal, then lexicographically
//! smaller chunk ID.
//!
//! # Consistency
//!
//! A snapshot is bound to one `model_id` and one dimension, fixed by its
//! first vector. Inserting a vector from another model or with another
//! dimension is rejected with [`RagError::IndexCorruption`]; so is a
//! query whose dimension differs from the snapshot's. An empty snapshot
//! accepts any model again.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::embedding::{dot, l2_normalize};
use crate::error::{RagError, Result};
use crate::models::{Chunk, Embedding, RetrievalResult, ScoredChunk};

/// A chunk and its unit-length vector.
#[derive(Debug)]
pub struct IndexEntry {
    pub chunk: Arc<Chunk>,
    pub vector: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// One immutable version of the index.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    version: u64,
    model_id: Option<String>,
    dims: Option<usize>,
    entries: Vec<Arc<IndexEntry>>,
    by_chunk: HashMap<String, usize>,
    /// Per-document buckets of chunk IDs.
    by_document: HashMap<String, Vec<String>>,
}

impl IndexSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }

    pub fn dims(&self) -> Option<usize> {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn document_count(&self) -> usize {
        self.by_document.len()
    }

    pub fn contains_chunk(&self, chunk_id: &str) -> bool {
        self.by_chunk.contains_key(chunk_id)
    }

    /// Chunk IDs held for a document, in insertion order.
    pub fn document_chunks(&self, document_id: &str) -> &[String] {
        self.by_document
            .get(document_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn entries(&self) -> impl Iterator<Item = &Arc<IndexEntry>> {
        self.entries.iter()
    }

    /// Top-`k` chunks by cosine similarity to `query`, best first.
    ///
    /// Returns an empty result for an empty snapshot or `k == 0`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult> {
        if self.entries.is_empty() || k == 0 {
            return Ok(RetrievalResult::default());
        }
        if let Some(dims) = self.dims {
            if query.len() != dims {
                return Err(RagError::corruption(format!(
                    "query vector has {} dims, index version {} holds {}",
                    query.len(),
                    self.version,
                    dims
                )));
            }
        }

        let mut q = query.to_vec();
        l2_normalize(&mut q);

        let capacity = k.min(self.entries.len()) + 1;
        let mut heap: BinaryHeap<Reverse<Candidate<'_>>> = BinaryHeap::with_capacity(capacity);
        for entry in &self.entries {
            let candidate = Candidate {
                score: dot(&q, &entry.vector),
                entry,
            };
            if heap.len() < k {
                heap.push(Reverse(candidate));
            } else if let Some(Reverse(worst)) = heap.peek() {
                if candidate > *worst {
                    heap.pop();
                    heap.push(Reverse(candidate));
                }
            }
        }

        let hits = heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(c)| ScoredChunk {
                chunk: c.entry.chunk.clone(),
                score: c.score,
            })
            .collect();
        Ok(RetrievalResult::new(hits))
    }

    fn insert(&mut self, chunk: Arc<Chunk>, embedding: Embedding) -> Result<()> {
        if chunk.id != embedding.chunk_id {
            return Err(RagError::corruption(format!(
                "embedding for {} attached to chunk {}",
                embedding.chunk_id, chunk.id
            )));
        }
        match &self.model_id {
            Some(model) if *model != embedding.model_id => {
                return Err(RagError::corruption(format!(
                    "model mismatch: index holds {}, got {}",
                    model, embedding.model_id
                )));
            }
            _ => {}
        }
        match self.dims {
            Some(dims) if dims != embedding.vector.len() => {
                return Err(RagError::corruption(format!(
                    "dimension mismatch: index holds {}, got {}",
                    dims,
                    embedding.vector.len()
                )));
            }
            _ => {}
        }
        if embedding.vector.is_empty() {
            return Err(RagError::corruption("empty vector"));
        }

        self.model_id = Some(embedding.model_id);
        self.dims = Some(embedding.vector.len());

        let mut vector = embedding.vector;
        l2_normalize(&mut vector);
        let entry = Arc::new(IndexEntry {
            chunk: chunk.clone(),
            vector,
            created_at: embedding.created_at,
        });

        if let Some(&pos) = self.by_chunk.get(&chunk.id) {
            let old_doc = self.entries[pos].chunk.document_id.clone();
            if old_doc != chunk.document_id {
                self.detach_from_document(&old_doc, &chunk.id);
                self.attach_to_document(&chunk);
            }
            self.entries[pos] = entry;
        } else {
            self.by_chunk.insert(chunk.id.clone(), self.entries.len());
            self.entries.push(entry);
            self.attach_to_document(&chunk);
        }
        Ok(())
    }

    fn remove(&mut self, chunk_id: &str) -> bool {
        let Some(pos) = self.by_chunk.remove(chunk_id) else {
            return false;
        };
        let removed = self.entries.swap_remove(pos);
        if let Some(moved) = self.entries.get(pos) {
            self.by_chunk.insert(moved.chunk.id.clone(), pos);
        }
        self.detach_from_document(&removed.chunk.document_id, chunk_id);
        if self.entries.is_empty() {
            self.model_id = None;
            self.dims = None;
        }
        true
    }

    fn remove_document(&mut self, document_id: &str) -> usize {
        let ids = self.by_document.get(document_id).cloned().unwrap_or_default();
        ids.iter().filter(|id| self.remove(id)).count()
    }

    fn attach_to_document(&mut self, chunk: &Chunk) {
        self.by_document
            .entry(chunk.document_id.clone())
            .or_default()
            .push(chunk.id.clone());
    }

    fn detach_from_document(&mut self, document_id: &str, chunk_id: &str) {
        if let Some(bucket) = self.by_document.get_mut(document_id) {
            bucket.retain(|id| id != chunk_id);
            if bucket.is_empty() {
                self.by_document.remove(document_id);
            }
        }
    }
}

/// A scored entry; `Greater` means "ranks before".
struct Candidate<'a> {
    score: f32,
    entry: &'a Arc<IndexEntry>,
}

impl Ord for Candidate<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.entry.chunk.ordinal.cmp(&self.entry.chunk.ordinal))
            .then_with(|| other.entry.chunk.id.cmp(&self.entry.chunk.id))
    }
}

impl PartialOrd for Candidate<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate<'_> {}

/// The shared, swappable index.
pub struct VectorIndex {
    current: RwLock<Arc<IndexSnapshot>>,
    writer: Mutex<()>,
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorIndex {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(IndexSnapshot::default())),
            writer: Mutex::new(()),
        }
    }

    /// The currently published snapshot. Stays valid (and unchanged) for
    /// as long as the caller holds it, whatever writers do meanwhile.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version()
    }

    /// Search the current snapshot.
    pub fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult> {
        self.snapshot().search(query, k)
    }

    /// Insert or replace one chunk's vector.
    pub fn upsert(&self, chunk: Chunk, embedding: Embedding) -> Result<u64> {
        self.mutate(|next| next.insert(Arc::new(chunk), embedding))
    }

    /// Remove one chunk. Returns whether it was present.
    pub fn remove(&self, chunk_id: &str) -> bool {
        let mut removed = false;
        // Removal cannot fail.
        let _ = self.mutate(|next| {
            removed = next.remove(chunk_id);
            Ok(())
        });
        removed
    }

    /// Remove every chunk of a document. Returns how many were removed.
    pub fn remove_document(&self, document_id: &str) -> usize {
        let mut removed = 0;
        let _ = self.mutate(|next| {
            removed = next.remove_document(document_id);
            Ok(())
        });
        removed
    }

    /// Atomically drop `previous_document_id`'s chunks (if any) and insert
    /// `entries`. Either the whole new set becomes visible or nothing changes.
    pub fn replace_document(
        &self,
        previous_document_id: Option<&str>,
        entries: Vec<(Chunk, Embedding)>,
    ) -> Result<u64> {
        self.mutate(|next| {
            if let Some(doc_id) = previous_document_id {
                next.remove_document(doc_id);
            }
            for (chunk, embedding) in entries {
                next.insert(Arc::new(chunk), embedding)?;
            }
            Ok(())
        })
    }

    /// Build a brand-new snapshot from `entries` and swap it in. The old
    /// snapshot keeps serving searches until the swap.
    pub fn rebuild(&self, entries: Vec<(Chunk, Embedding)>) -> Result<u64> {
        let mut fresh = IndexSnapshot::default();
        for (chunk, embedding) in entries {
            fresh.insert(Arc::new(chunk), embedding)?;
        }

        let _guard = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        fresh.version = self.snapshot().version + 1;
        let version = fresh.version;
        debug!(version, chunks = fresh.len(), "publishing rebuilt index");
        self.publish(fresh);
        Ok(version)
    }

    fn mutate<F>(&self, apply: F) -> Result<u64>
    where
        F: FnOnce(&mut IndexSnapshot) -> Result<()>,
    {
        let _guard = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let mut next = (*self.snapshot()).clone();
        apply(&mut next)?;
        next.version += 1;
        let version = next.version;
        self.publish(next);
        Ok(version)
    }

    fn publish(&self, next: IndexSnapshot) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = Arc::new(next);
    }
}
