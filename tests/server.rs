//! HTTP server tests against a real listener on an ephemeral port.

use async_trait::async_trait;
use sahayak_rag::config::Config;
use sahayak_rag::embedding::HashEmbedder;
use sahayak_rag::engine::RagEngine;
use sahayak_rag::error::{RagError, Result};
use sahayak_rag::generation::{GenerationParams, Generator};
use sahayak_rag::prompt::Prompt;
use sahayak_rag::server::router;
use sahayak_rag::store::MemoryStore;
use serde_json::{json, Value};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Answers with a fixed text, or always fails when `answer` is `None`.
struct FixedGenerator {
    answer: Option<String>,
    calls: AtomicUsize,
}

#[async_trait]
impl Generator for FixedGenerator {
    fn model_id(&self) -> &str {
        "fixed"
    }

    async fn generate(&self, _prompt: &Prompt, _params: GenerationParams) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.answer {
            Some(a) => Ok(a.clone()),
            None => Err(RagError::generation("connection refused", true)),
        }
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    generator: Arc<FixedGenerator>,
    _tmp: TempDir,
}

async fn start(answer: Option<&str>) -> TestServer {
    let tmp = TempDir::new().unwrap();
    let knowledge = tmp.path().join("knowledge");
    fs::create_dir_all(knowledge.join("schemes")).unwrap();
    fs::write(
        knowledge.join("emi.txt"),
        "EMI is calculated as P x r x (1+r)^n / ((1+r)^n - 1) on the reducing balance.",
    )
    .unwrap();
    fs::write(
        knowledge.join("schemes").join("pmjdy.md"),
        "# PMJDY\n\nPradhan Mantri Jan Dhan Yojana offers zero-balance savings accounts.",
    )
    .unwrap();

    let mut config = Config::new(tmp.path().join("db.sqlite"));
    config.knowledge.root = knowledge;
    config.retrieval.min_similarity = -1.0;
    config.generation.retry_delay_ms = 1;

    let generator = Arc::new(FixedGenerator {
        answer: answer.map(str::to_string),
        calls: AtomicUsize::new(0),
    });
    let engine = RagEngine::with_components(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(HashEmbedder::new(128)),
        generator.clone(),
    )
    .await
    .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(Arc::new(engine));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
        generator,
        _tmp: tmp,
    }
}

impl TestServer {
    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self
            .client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn ingest(&self) -> Value {
        let (status, body) = self.post("/admin/ingest", json!({})).await;
        assert_eq!(status, 200, "{body}");
        body
    }
}

#[tokio::test]
async fn test_health() {
    let server = start(Some("ok")).await;
    let (status, body) = server.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_ingest_then_status() {
    let server = start(Some("ok")).await;
    let report = server.ingest().await;
    assert_eq!(report["scanned"], 2);
    assert_eq!(report["indexed"].as_array().unwrap().len(), 2);
    assert!(report["failed"].as_array().unwrap().is_empty());

    let again = server.ingest().await;
    assert_eq!(again["unchanged"], 2);

    let (status, body) = server.get("/status").await;
    assert_eq!(status, 200);
    assert_eq!(body["documents"], 2);
    assert_eq!(body["index_chunks"], body["chunks"]);
    assert_eq!(body["rebuild_required"], false);
}

#[tokio::test]
async fn test_ask_returns_grounded_answer_and_intent() {
    let server = start(Some("EMI uses the reducing balance formula [S1]")).await;
    server.ingest().await;

    let (status, body) = server
        .post("/ask", json!({ "query": "How is EMI calculated?" }))
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["generated_answer"]["outcome"], "grounded");
    assert_eq!(body["intent"], "knowledge");
    assert_eq!(body["query_text"], "How is EMI calculated?");
    assert_eq!(body["retrieval_results"][0]["chunk"]["source_path"], "emi.txt");
    assert!(body["generated_answer"]["answer_text"]
        .as_str()
        .unwrap()
        .contains("Sources: emi.txt"));
}

#[tokio::test]
async fn test_ask_during_outage_is_still_200() {
    let server = start(None).await;
    server.ingest().await;

    let (status, body) = server
        .post("/ask", json!({ "query": "Am I eligible for a loan?", "include_sources": false }))
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["generated_answer"]["outcome"], "unavailable");
    assert_eq!(body["confidence"], 0.0);
    assert_eq!(body["intent"], "eligibility");
    assert_eq!(server.generator.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_ask_on_empty_knowledge_base() {
    let server = start(Some("unused")).await;
    let (status, body) = server.post("/ask", json!({ "query": "What is PMJDY?" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["generated_answer"]["outcome"], "no_context");
    assert_eq!(server.generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_query_is_bad_request() {
    let server = start(Some("ok")).await;
    let (status, body) = server.post("/ask", json!({ "query": "   " })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = server.post("/search", json!({ "query": "" })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_oversized_top_k_is_bad_request() {
    let server = start(Some("ok")).await;
    server.ingest().await;

    let huge = json!(1_000_000_000_000_000u64);
    let (status, body) = server
        .post("/search", json!({ "query": "savings", "top_k": huge }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = server
        .post("/ask", json!({ "query": "savings", "top_k": 101 }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _) = server.get("/health").await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_search_respects_top_k() {
    let server = start(Some("ok")).await;
    server.ingest().await;
    let (status, body) = server
        .post("/search", json!({ "query": "savings account", "top_k": 1 }))
        .await;
    assert_eq!(status, 200, "{body}");
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["chunk"]["source_path"], "schemes/pmjdy.md");
}

#[tokio::test]
async fn test_eligibility_endpoint() {
    let server = start(Some("ok")).await;
    let (status, body) = server
        .post(
            "/eligibility",
            json!({
                "income_annum": 600000.0,
                "loan_amount": 1000000.0,
                "loan_term": 10.0,
                "cibil_score": 780.0,
                "no_of_dependents": 1
            }),
        )
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["eligible"], true);
    assert_eq!(body["interest_rate"], 8.5);
    assert_eq!(body["tenure_months"], 120);
    assert_eq!(body["emi_schedule"].as_array().unwrap().len(), 120);

    let (status, body) = server
        .post(
            "/eligibility",
            json!({
                "income_annum": -1.0,
                "loan_amount": 1000.0,
                "loan_term": 1.0,
                "cibil_score": 700.0
            }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "invalid_profile");

    let (status, body) = server
        .post(
            "/eligibility",
            json!({
                "income_annum": 600000.0,
                "loan_amount": 100000.0,
                "loan_term": 5.0e9,
                "cibil_score": 780.0
            }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "invalid_profile");
}

#[tokio::test]
async fn test_ingest_missing_path_is_not_found() {
    let server = start(Some("ok")).await;
    let (status, body) = server
        .post("/admin/ingest", json!({ "path": "/definitely/not/here" }))
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_reindex_endpoint() {
    let server = start(Some("ok")).await;
    server.ingest().await;
    let (status, body) = server.post("/admin/reindex", json!({})).await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["chunks"], 2);
    assert_eq!(body["model_id"], "hash-v1-128");
}
