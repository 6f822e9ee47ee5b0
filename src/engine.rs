//! The answer engine: ingestion, index lifecycle and the query pipeline.
//!
//! [`RagEngine`] owns the durable [`Store`], the in-memory [`VectorIndex`]
//! and the two external boundaries. Queries run concurrently against index
//! snapshots and never mutate shared state. Mutations (ingest, remove,
//! reindex) are serialized by an async mutex; each one is committed to the
//! store first and then published to the index with a single snapshot swap.
//!
//! The store is the source of truth. If the swap fails after the store has
//! committed, the engine flags `rebuild_required` and the two disagree until
//! one of: re-ingesting the source (an unchanged source whose chunks are
//! missing from the index is indexed again), [`RagEngine::reindex`], or the
//! next start, which rebuilds the index from the store.
//!
//! # Query pipeline
//!
//! ```text
//! question ─▶ Retriever (embed + search + filter)
//!          ─▶ context::assemble (budgeted, deduplicated)
//!          ─▶ AnswerGenerator (prompt + bounded retry + fallback)
//!          ─▶ AnsweredQuery
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::answer::AnswerGenerator;
use crate::chunk::document_id;
use crate::config::Config;
use crate::context::assemble;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{RagError, Result};
use crate::extract::read_source;
use crate::generation::{create_generator, Generator};
use crate::index::VectorIndex;
use crate::ingest::{
    embed_chunks, normalize_text, prepare_document, FolderReport, IngestFailure, IngestReport,
    IngestStatus,
};
use crate::models::{
    AnswerOutcome, AnsweredQuery, AssembledContext, Chunk, Embedding, RetrievalResult, SourceText,
};
use crate::prompt::{scheme_question, term_question};
use crate::retriever::{RetrieveOptions, Retriever};
use crate::scan::scan_folder;
use crate::store::{SqliteStore, Store};

/// Per-question overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct AskOptions {
    pub retrieve: RetrieveOptions,
    /// Overrides `generation.include_sources`.
    pub include_sources: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReindexReport {
    pub chunks: usize,
    pub index_version: u64,
    pub model_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub documents: usize,
    pub chunks: usize,
    pub embeddings: usize,
    pub stored_model_ids: Vec<String>,
    pub index_version: u64,
    pub index_chunks: usize,
    pub index_dims: Option<usize>,
    pub embedding_model: String,
    pub generation_model: String,
    pub generator_available: bool,
    pub rebuild_required: bool,
}

pub struct RagEngine {
    config: Config,
    store: Arc<dyn Store>,
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    retriever: Retriever,
    answerer: AnswerGenerator,
    write_lock: Mutex<()>,
    rebuild_required: AtomicBool,
}

impl RagEngine {
    /// Open the SQLite store named in `config`, build the configured
    /// providers and load the index.
    pub async fn open(config: Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(&config.db.path).await?);
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        Self::with_components(config, store, embedder, generator).await
    }

    /// Assemble an engine from explicit parts and load the index from `store`.
    pub async fn with_components(
        config: Config,
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        let index = Arc::new(VectorIndex::new());
        let retriever = Retriever::new(embedder.clone(), index.clone(), config.retrieval.clone());
        let answerer = AnswerGenerator::new(generator, config.generation.clone());

        let engine = Self {
            config,
            store,
            index,
            embedder,
            retriever,
            answerer,
            write_lock: Mutex::new(()),
            rebuild_required: AtomicBool::new(false),
        };
        engine.load_index().await?;
        Ok(engine)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn rebuild_required(&self) -> bool {
        self.rebuild_required.load(Ordering::SeqCst)
    }

    /// Rebuild the index from stored embeddings. Falls back to a full
    /// re-embed when any chunk lacks an embedding or was embedded by a
    /// different model or dimension.
    async fn load_index(&self) -> Result<()> {
        let entries = self.store.load_entries().await?;
        if entries.is_empty() {
            return Ok(());
        }

        let model_id = self.embedder.model_id();
        let dims = self.embedder.dims();
        let compatible = entries.iter().all(|e| {
            e.embedding
                .as_ref()
                .is_some_and(|emb| emb.model_id == model_id && emb.vector.len() == dims)
        });

        if !compatible {
            warn!(
                model = model_id,
                dims, "stored embeddings do not match the configured embedder; re-embedding"
            );
            self.reindex_locked(entries.into_iter().map(|e| e.chunk).collect())
                .await?;
            return Ok(());
        }

        let pairs: Vec<(Chunk, Embedding)> = entries
            .into_iter()
            .filter_map(|e| e.embedding.map(|emb| (e.chunk, emb)))
            .collect();
        let chunks = pairs.len();
        let version = self.index.rebuild(pairs)?;
        info!(chunks, version, model = model_id, "index loaded from store");
        Ok(())
    }

    // ============ Ingestion ============

    /// Ingest one source. Unchanged content is skipped unless `force`.
    pub async fn ingest_source(&self, source: SourceText, force: bool) -> Result<IngestReport> {
        let _guard = self.write_lock.lock().await;
        self.ingest_source_locked(source, force).await
    }

    async fn ingest_source_locked(&self, source: SourceText, force: bool) -> Result<IngestReport> {
        let previous = self.store.document_by_source(&source.source_path).await?;

        if let Some(prev) = &previous {
            let unchanged = prev.document_id
                == document_id(&source.source_path, &normalize_text(&source.text));
            let indexed = self.index.snapshot().document_chunks(&prev.document_id).len();
            if unchanged && !force && indexed == prev.chunk_count {
                return Ok(IngestReport {
                    source_path: source.source_path,
                    document_id: prev.document_id.clone(),
                    version: prev.version,
                    chunks: prev.chunk_count,
                    status: IngestStatus::Unchanged,
                });
            }
        }

        let version = previous.as_ref().map_or(1, |p| p.version + 1);
        let prepared = prepare_document(&source, version, &self.config.chunking)?;
        let embeddings = embed_chunks(self.embedder.as_ref(), &prepared.chunks).await?;

        self.store
            .replace_document(&prepared.document, &prepared.chunks, &embeddings)
            .await?;

        let chunk_count = prepared.chunks.len();
        let pairs: Vec<(Chunk, Embedding)> = prepared.chunks.into_iter().zip(embeddings).collect();
        let previous_id = previous.as_ref().map(|p| p.document_id.as_str());
        if let Err(e) = self.index.replace_document(previous_id, pairs) {
            self.mark_rebuild(&e);
            return Err(e);
        }

        info!(
            source = %prepared.document.source_path,
            version,
            chunks = chunk_count,
            "document indexed"
        );
        Ok(IngestReport {
            source_path: prepared.document.source_path,
            document_id: prepared.document.id,
            version,
            chunks: chunk_count,
            status: IngestStatus::Indexed,
        })
    }

    /// Ingest a single file, stored under its path as given.
    pub async fn ingest_path(&self, path: &Path, force: bool) -> Result<IngestReport> {
        let source_path = path.to_string_lossy().replace('\\', "/");
        let source = read_blocking(path.to_path_buf(), source_path).await?;
        self.ingest_source(source, force).await
    }

    /// Ingest every matching file under `root` (default `knowledge.root`).
    ///
    /// `full` re-ingests unchanged files; `prune` removes stored sources
    /// that are no longer in the folder. Per-file failures are reported and
    /// skipped; storage and index failures abort.
    pub async fn ingest_folder(&self, root: Option<&Path>, full: bool, prune: bool) -> Result<FolderReport> {
        let root = root.unwrap_or(&self.config.knowledge.root);
        let files = scan_folder(&self.config.knowledge, root)?;
        let _guard = self.write_lock.lock().await;

        let mut report = FolderReport {
            scanned: files.len(),
            ..FolderReport::default()
        };

        for file in &files {
            let outcome = match read_blocking(file.path.clone(), file.source_path.clone()).await {
                Ok(source) => self.ingest_source_locked(source, full).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(r) if r.status == IngestStatus::Unchanged => report.unchanged += 1,
                Ok(r) => report.indexed.push(r),
                Err(e @ (RagError::Storage(_) | RagError::IndexCorruption { .. })) => return Err(e),
                Err(e) => {
                    warn!(source = %file.source_path, error = %e, "skipping source");
                    report.failed.push(IngestFailure {
                        source_path: file.source_path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if prune {
            let present: std::collections::HashSet<&str> =
                files.iter().map(|f| f.source_path.as_str()).collect();
            for record in self.store.list_sources().await? {
                if !present.contains(record.source_path.as_str()) {
                    self.remove_locked(&record.source_path).await?;
                    report.removed.push(record.source_path);
                }
            }
        }

        info!(
            scanned = report.scanned,
            indexed = report.indexed.len(),
            unchanged = report.unchanged,
            removed = report.removed.len(),
            failed = report.failed.len(),
            "folder ingest complete"
        );
        Ok(report)
    }

    /// Remove a source and its chunks. Returns whether it existed.
    pub async fn remove_source(&self, source_path: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        self.remove_locked(source_path).await
    }

    async fn remove_locked(&self, source_path: &str) -> Result<bool> {
        match self.store.remove_source(source_path).await? {
            Some(doc_id) => {
                let removed = self.index.remove_document(&doc_id);
                info!(source = source_path, chunks = removed, "source removed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ============ Index lifecycle ============

    /// Re-embed every stored chunk with the current embedder, build a new
    /// index off to the side, swap it in and persist the new embeddings.
    /// Searches keep using the old snapshot until the swap.
    pub async fn reindex(&self) -> Result<ReindexReport> {
        let _guard = self.write_lock.lock().await;
        let chunks = self
            .store
            .load_entries()
            .await?
            .into_iter()
            .map(|e| e.chunk)
            .collect();
        self.reindex_locked(chunks).await
    }

    async fn reindex_locked(&self, chunks: Vec<Chunk>) -> Result<ReindexReport> {
        let embeddings = embed_chunks(self.embedder.as_ref(), &chunks).await?;
        let count = chunks.len();
        let pairs: Vec<(Chunk, Embedding)> = chunks.into_iter().zip(embeddings.iter().cloned()).collect();
        let index_version = self.index.rebuild(pairs)?;
        self.store.replace_embeddings(&embeddings).await?;
        self.rebuild_required.store(false, Ordering::SeqCst);

        info!(chunks = count, index_version, model = self.embedder.model_id(), "reindex complete");
        Ok(ReindexReport {
            chunks: count,
            index_version,
            model_id: self.embedder.model_id().to_string(),
        })
    }

    fn mark_rebuild(&self, err: &RagError) {
        if matches!(err, RagError::IndexCorruption { .. }) {
            error!(error = %err, "index corruption detected; rebuild required");
            self.rebuild_required.store(true, Ordering::SeqCst);
        }
    }

    // ============ Queries ============

    /// Retrieval only. Errors are returned as-is so callers can choose a
    /// fallback flow.
    pub async fn search(&self, query: &str, options: RetrieveOptions) -> Result<RetrievalResult> {
        self.retriever
            .retrieve_with(query, options)
            .await
            .inspect_err(|e| self.mark_rebuild(e))
    }

    /// Answer a question. Never fails: outages and empty knowledge degrade
    /// to a deterministic fallback answer.
    pub async fn ask(&self, query: &str) -> AnsweredQuery {
        self.ask_with(query, AskOptions::default()).await
    }

    pub async fn ask_with(&self, query: &str, options: AskOptions) -> AnsweredQuery {
        let include_sources = options
            .include_sources
            .unwrap_or(self.config.generation.include_sources);

        let (retrieval, generated_answer, assembled_context) =
            match self.search(query, options.retrieve).await {
                Ok(retrieval) => {
                    let context = assemble(&retrieval, self.config.context.max_context_tokens);
                    let answer = self
                        .answerer
                        .answer_with(query, &context, include_sources)
                        .await;
                    (retrieval, answer, context)
                }
                Err(RagError::EmptyKnowledgeBase) => {
                    info!("knowledge base is empty");
                    let context = AssembledContext::default();
                    let answer = self
                        .answerer
                        .answer_with(query, &context, include_sources)
                        .await;
                    (RetrievalResult::default(), answer, context)
                }
                Err(e) => {
                    warn!(error = %e, "retrieval failed, using fallback");
                    (
                        RetrievalResult::default(),
                        self.answerer.fallback(AnswerOutcome::Unavailable),
                        AssembledContext::default(),
                    )
                }
            };

        let confidence = if generated_answer.outcome == AnswerOutcome::Grounded {
            (retrieval.mean_score() * 100.0).round() / 100.0
        } else {
            0.0
        };

        AnsweredQuery {
            id: Uuid::new_v4().to_string(),
            query_text: query.to_string(),
            retrieval_results: retrieval,
            assembled_context,
            generated_answer,
            confidence,
            timestamp: Utc::now(),
        }
    }

    pub async fn explain_term(&self, term: &str) -> AnsweredQuery {
        self.ask(&term_question(term)).await
    }

    pub async fn explain_scheme(&self, name: &str) -> AnsweredQuery {
        self.ask(&scheme_question(name)).await
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        let stats = self.store.stats().await?;
        let snapshot = self.index.snapshot();
        let generator = self.answerer.generator();
        Ok(EngineStatus {
            documents: stats.documents,
            chunks: stats.chunks,
            embeddings: stats.embeddings,
            stored_model_ids: stats.model_ids,
            index_version: snapshot.version(),
            index_chunks: snapshot.len(),
            index_dims: snapshot.dims(),
            embedding_model: self.embedder.model_id().to_string(),
            generation_model: generator.model_id().to_string(),
            generator_available: generator.is_available(),
            rebuild_required: self.rebuild_required(),
        })
    }
}

/// File reads and PDF extraction run on the blocking pool.
async fn read_blocking(path: std::path::PathBuf, source_path: String) -> Result<SourceText> {
    let label = source_path.clone();
    tokio::task::spawn_blocking(move || read_source(&path, &source_path))
        .await
        .map_err(|e| RagError::ingest(label, format!("reader task failed: {}", e)))?
}
