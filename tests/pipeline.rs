//! End-to-end tests of the query pipeline through the public traits.
//!
//! Embedding uses the deterministic hash embedder (optionally wrapped to
//! count calls); generation uses scripted in-process generators so every
//! outcome is reproducible without network access.

use async_trait::async_trait;
use sahayak_rag::config::{Config, EmptyContextPolicy, EmptyIndexPolicy};
use sahayak_rag::embedding::{create_embedder, Embedder, HashEmbedder};
use sahayak_rag::engine::RagEngine;
use sahayak_rag::error::{RagError, Result};
use sahayak_rag::generation::{GenerationParams, Generator};
use sahayak_rag::models::{AnswerOutcome, SourceText};
use sahayak_rag::prompt::Prompt;
use sahayak_rag::store::{MemoryStore, SqliteStore, Store};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const EMI_DOC: &str = "EMI (equated monthly instalment) is calculated with the formula \
EMI = P x r x (1+r)^n / ((1+r)^n - 1), where P is the principal, r the monthly \
interest rate and n the number of monthly instalments.";

const KCC_DOC: &str = "Kisan Credit Card gives farmers short-term credit for crops, \
with interest subvention for prompt repayment.";

// ─── Test doubles ───────────────────────────────────────────────────

/// Hash embedder that counts batch calls.
struct CountingEmbedder {
    inner: HashEmbedder,
    calls: AtomicUsize,
}

impl CountingEmbedder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: HashEmbedder::new(128),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_batch(texts).await
    }
}

/// Fails the first `failures` calls with a transient error, then answers
/// with `answer`. Records every prompt it receives.
struct ScriptedGenerator {
    failures: usize,
    answer: String,
    calls: AtomicUsize,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedGenerator {
    fn new(failures: usize, answer: &str) -> Arc<Self> {
        Arc::new(Self {
            failures,
            answer: answer.to_string(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &Prompt, _params: GenerationParams) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            Err(RagError::generation("HTTP 503 Service Unavailable", true))
        } else {
            Ok(self.answer.clone())
        }
    }
}

/// Hash embedder whose output width can be changed mid-test.
struct ResizableEmbedder {
    dims: AtomicUsize,
}

#[async_trait]
impl Embedder for ResizableEmbedder {
    fn model_id(&self) -> &str {
        "resizable"
    }

    fn dims(&self) -> usize {
        self.dims.load(Ordering::SeqCst)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        HashEmbedder::new(self.dims()).embed_batch(texts).await
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn test_config(db_path: &std::path::Path) -> Config {
    let mut config = Config::new(db_path);
    config.generation.retry_delay_ms = 1;
    config.retrieval.min_similarity = 0.0;
    config
}

fn source(path: &str, text: &str) -> SourceText {
    SourceText {
        source_path: path.to_string(),
        content_type: "text/plain".to_string(),
        text: text.to_string(),
    }
}

async fn engine(
    config: Config,
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
) -> RagEngine {
    RagEngine::with_components(config, store, embedder, generator)
        .await
        .unwrap()
}

// ─── Grounded answer ────────────────────────────────────────────────

#[tokio::test]
async fn test_grounded_answer_cites_the_emi_document() {
    let tmp = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new(0, "EMI = P x r x (1+r)^n / ((1+r)^n - 1) [S1]");
    let engine = engine(
        test_config(&tmp.path().join("db.sqlite")),
        Arc::new(MemoryStore::new()),
        CountingEmbedder::new(),
        generator.clone(),
    )
    .await;
    engine.ingest_source(source("emi.txt", EMI_DOC), false).await.unwrap();
    engine.ingest_source(source("kcc.txt", KCC_DOC), false).await.unwrap();

    let answered = engine.ask("How is EMI calculated?").await;

    assert_eq!(answered.generated_answer.outcome, AnswerOutcome::Grounded);
    assert_eq!(answered.retrieval_results.hits[0].chunk.source_path, "emi.txt");
    assert!(answered.generated_answer.answer_text.contains("(1+r)^n"));
    assert!(answered.generated_answer.answer_text.contains("Sources: emi.txt"));
    assert_eq!(answered.generated_answer.citations_used.len(), 1);
    assert_eq!(answered.generated_answer.citations_used[0].source_path, "emi.txt");
    assert!(answered.confidence > 0.0 && answered.confidence <= 1.0);

    // The model saw the formula in its context, under the question.
    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].user.contains("[S1] emi.txt #0"));
    assert!(prompts[0].user.contains("How is EMI calculated?"));
    assert!(prompts[0].system.contains("ONLY from the reference context"));
}

#[tokio::test]
async fn test_grounded_answer_with_default_settings() {
    let tmp = TempDir::new().unwrap();
    let config = Config::new(tmp.path().join("db.sqlite"));
    let embedder = create_embedder(&config.embedding).unwrap();
    let generator = ScriptedGenerator::new(0, "EMI is principal×rate/(1-(1+rate)^-tenure) [S1]");
    let engine = engine(config, Arc::new(MemoryStore::new()), embedder, generator.clone()).await;
    engine
        .ingest_source(
            source(
                "emi.txt",
                "EMI is calculated as principal×rate/(1-(1+rate)^-tenure).",
            ),
            false,
        )
        .await
        .unwrap();

    let answered = engine.ask("How is EMI calculated?").await;

    assert!(!answered.retrieval_results.is_empty());
    assert_eq!(answered.retrieval_results.hits[0].chunk.source_path, "emi.txt");
    assert!(answered.retrieval_results.hits[0].score >= 0.2);
    assert_eq!(answered.generated_answer.outcome, AnswerOutcome::Grounded);
    assert!(answered.generated_answer.answer_text.contains("Sources: emi.txt"));
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_sources_footer_can_be_disabled_per_question() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(
        test_config(&tmp.path().join("db.sqlite")),
        Arc::new(MemoryStore::new()),
        CountingEmbedder::new(),
        ScriptedGenerator::new(0, "answer"),
    )
    .await;
    engine.ingest_source(source("emi.txt", EMI_DOC), false).await.unwrap();

    let options = sahayak_rag::engine::AskOptions {
        include_sources: Some(false),
        ..Default::default()
    };
    let answered = engine.ask_with("EMI formula", options).await;
    assert_eq!(answered.generated_answer.answer_text, "answer");
}

// ─── Empty knowledge base ───────────────────────────────────────────

#[tokio::test]
async fn test_empty_index_falls_back_without_calling_generator() {
    let tmp = TempDir::new().unwrap();
    let embedder = CountingEmbedder::new();
    let generator = ScriptedGenerator::new(0, "should not be used");
    let engine = engine(
        test_config(&tmp.path().join("db.sqlite")),
        Arc::new(MemoryStore::new()),
        embedder.clone(),
        generator.clone(),
    )
    .await;

    let answered = engine.ask("What is PMJDY?").await;

    assert!(answered.retrieval_results.is_empty());
    assert_eq!(answered.generated_answer.outcome, AnswerOutcome::NoContext);
    assert_eq!(
        answered.generated_answer.answer_text,
        engine.config().generation.no_context_message
    );
    assert_eq!(answered.confidence, 0.0);
    assert_eq!(generator.calls(), 0);
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_empty_index_error_policy_still_answers() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(&tmp.path().join("db.sqlite"));
    config.retrieval.empty_index_policy = EmptyIndexPolicy::Error;
    let engine = engine(
        config,
        Arc::new(MemoryStore::new()),
        CountingEmbedder::new(),
        ScriptedGenerator::new(0, "unused"),
    )
    .await;

    let err = engine.search("What is PMJDY?", Default::default()).await.unwrap_err();
    assert!(matches!(err, RagError::EmptyKnowledgeBase));

    let answered = engine.ask("What is PMJDY?").await;
    assert_eq!(answered.generated_answer.outcome, AnswerOutcome::NoContext);
}

#[tokio::test]
async fn test_empty_index_generate_without_context() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(&tmp.path().join("db.sqlite"));
    config.generation.on_empty_context = EmptyContextPolicy::GenerateWithoutContext;
    let generator = ScriptedGenerator::new(0, "I could not find reference material on PMJDY.");
    let engine = engine(
        config,
        Arc::new(MemoryStore::new()),
        CountingEmbedder::new(),
        generator.clone(),
    )
    .await;

    let answered = engine.ask("What is PMJDY?").await;

    assert_eq!(answered.generated_answer.outcome, AnswerOutcome::WithoutContext);
    assert!(answered.generated_answer.citations_used.is_empty());
    assert!(!answered.generated_answer.answer_text.contains("Sources:"));
    assert_eq!(answered.confidence, 0.0);
    assert_eq!(generator.calls(), 1);
    assert!(generator.prompts.lock().unwrap()[0].system.contains("No reference material"));
}

// ─── Generation outage ──────────────────────────────────────────────

#[tokio::test]
async fn test_generation_outage_retries_once_then_falls_back() {
    let tmp = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new(2, "never returned");
    let engine = engine(
        test_config(&tmp.path().join("db.sqlite")),
        Arc::new(MemoryStore::new()),
        CountingEmbedder::new(),
        generator.clone(),
    )
    .await;
    engine.ingest_source(source("emi.txt", EMI_DOC), false).await.unwrap();

    let answered = engine.ask("How is EMI calculated?").await;

    assert_eq!(generator.calls(), 2);
    assert!(!answered.retrieval_results.is_empty());
    assert_eq!(answered.generated_answer.outcome, AnswerOutcome::Unavailable);
    assert_eq!(
        answered.generated_answer.answer_text,
        engine.config().generation.unavailable_message
    );
    assert!(answered.generated_answer.citations_used.is_empty());

    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts[0], prompts[1]);
}

#[tokio::test]
async fn test_single_transient_failure_is_recovered() {
    let tmp = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new(1, "EMI uses the reducing balance formula [S1]");
    let engine = engine(
        test_config(&tmp.path().join("db.sqlite")),
        Arc::new(MemoryStore::new()),
        CountingEmbedder::new(),
        generator.clone(),
    )
    .await;
    engine.ingest_source(source("emi.txt", EMI_DOC), false).await.unwrap();

    let answered = engine.ask("How is EMI calculated?").await;
    assert_eq!(generator.calls(), 2);
    assert_eq!(answered.generated_answer.outcome, AnswerOutcome::Grounded);
}

// ─── Persistence ────────────────────────────────────────────────────

#[tokio::test]
async fn test_restart_loads_index_without_reembedding() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("data").join("sahayak.sqlite");

    let chunks_before;
    {
        let store = Arc::new(SqliteStore::open(&db_path).await.unwrap());
        let first = engine(
            test_config(&db_path),
            store.clone(),
            CountingEmbedder::new(),
            ScriptedGenerator::new(0, "ok"),
        )
        .await;
        first.ingest_source(source("emi.txt", EMI_DOC), false).await.unwrap();
        first.ingest_source(source("kcc.txt", KCC_DOC), false).await.unwrap();
        chunks_before = first.status().await.unwrap().index_chunks;
        store.close().await;
    }

    let embedder = CountingEmbedder::new();
    let store = Arc::new(SqliteStore::open(&db_path).await.unwrap());
    let reopened = engine(
        test_config(&db_path),
        store,
        embedder.clone(),
        ScriptedGenerator::new(0, "ok"),
    )
    .await;

    assert_eq!(embedder.calls(), 0);
    let status = reopened.status().await.unwrap();
    assert_eq!(status.documents, 2);
    assert_eq!(status.index_chunks, chunks_before);

    let hits = reopened.search("EMI formula", Default::default()).await.unwrap();
    assert_eq!(hits.hits[0].chunk.source_path, "emi.txt");
}

#[tokio::test]
async fn test_reingest_is_idempotent_in_sqlite() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("sahayak.sqlite");
    let store = Arc::new(SqliteStore::open(&db_path).await.unwrap());
    let embedder = CountingEmbedder::new();
    let engine = engine(
        test_config(&db_path),
        store.clone(),
        embedder.clone(),
        ScriptedGenerator::new(0, "ok"),
    )
    .await;

    engine.ingest_source(source("emi.txt", EMI_DOC), false).await.unwrap();
    let chunks = engine.index().len();
    let calls = embedder.calls();

    engine.ingest_source(source("emi.txt", EMI_DOC), false).await.unwrap();
    assert_eq!(engine.index().len(), chunks);
    assert_eq!(embedder.calls(), calls);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.chunks, chunks);
    assert_eq!(stats.embeddings, chunks);
}

#[tokio::test]
async fn test_failed_index_swap_is_flagged_and_repaired() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(ResizableEmbedder {
        dims: AtomicUsize::new(32),
    });
    let engine = engine(
        test_config(&tmp.path().join("db.sqlite")),
        Arc::new(MemoryStore::new()),
        embedder.clone(),
        ScriptedGenerator::new(0, "unused"),
    )
    .await;
    engine.ingest_source(source("emi.txt", EMI_DOC), false).await.unwrap();

    // The store accepts the new document but the index rejects its width.
    embedder.dims.store(64, Ordering::SeqCst);
    let err = engine
        .ingest_source(source("kcc.txt", KCC_DOC), false)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::IndexCorruption { .. }));
    let status = engine.status().await.unwrap();
    assert_eq!(status.documents, 2);
    assert!(status.rebuild_required);
    assert_eq!(engine.index().snapshot().document_count(), 1);

    // Re-ingesting unchanged content still repairs the missing index entries.
    embedder.dims.store(32, Ordering::SeqCst);
    let report = engine.ingest_source(source("kcc.txt", KCC_DOC), false).await.unwrap();
    assert_eq!(report.status, sahayak_rag::ingest::IngestStatus::Indexed);
    assert_eq!(engine.index().snapshot().document_count(), 2);

    engine.reindex().await.unwrap();
    assert!(!engine.status().await.unwrap().rebuild_required);
}

// ─── Concurrency ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queries_run_while_ingesting() {
    let tmp = TempDir::new().unwrap();
    let engine = Arc::new(
        engine(
            test_config(&tmp.path().join("db.sqlite")),
            Arc::new(MemoryStore::new()),
            CountingEmbedder::new(),
            ScriptedGenerator::new(0, "answer [S1]"),
        )
        .await,
    );
    engine.ingest_source(source("emi.txt", EMI_DOC), false).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            engine
                .ingest_source(source(&format!("doc-{i}.txt"), &format!("{KCC_DOC} {i}")), false)
                .await
                .map(|_| ())
        }));
    }
    for _ in 0..16 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            let answered = engine.ask("How is EMI calculated?").await;
            assert_eq!(answered.generated_answer.outcome, AnswerOutcome::Grounded);
            Ok::<(), RagError>(())
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let status = engine.status().await.unwrap();
    assert_eq!(status.documents, 9);
    assert_eq!(status.index_chunks, status.chunks);
}
