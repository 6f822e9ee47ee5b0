//! HTTP front-end adapter.
//!
//! Exposes the answer engine and the eligibility evaluator as a JSON API.
//! Handlers share one [`RagEngine`] behind an `Arc`; queries run
//! concurrently, admin mutations are serialized inside the engine.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | Answer a question (always 200 unless the request is malformed) |
//! | `POST` | `/search` | Retrieval only |
//! | `POST` | `/eligibility` | Evaluate an applicant profile |
//! | `POST` | `/admin/ingest` | Ingest the knowledge folder, a sub-folder or a file |
//! | `POST` | `/admin/reindex` | Re-embed everything and swap in a fresh index |
//! | `GET`  | `/status` | Store and index counters |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Codes are `bad_request` (400), `invalid_profile` (400), `not_found` (404)
//! and the engine codes from [`RagError::code`]. `/ask` never reports
//! embedding or generation outages as errors; it answers with a fallback.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! front-ends.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::eligibility::{evaluate, ApplicantProfile, EligibilityError, EligibilityResult};
use crate::engine::{AskOptions, EngineStatus, RagEngine, ReindexReport};
use crate::error::RagError;
use crate::ingest::{FolderReport, IngestStatus};
use crate::intent::{classify, Intent};
use crate::models::{AnsweredQuery, RetrievalResult};
use crate::retriever::{RetrieveOptions, MAX_TOP_K};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    engine: Arc<RagEngine>,
    /// Set while a background rebuild triggered by index corruption runs.
    rebuilding: Arc<AtomicBool>,
}

/// Build the router without binding. Used by [`run_server`] and by tests
/// that serve on an ephemeral port.
pub fn router(engine: Arc<RagEngine>) -> Router {
    let state = AppState {
        engine,
        rebuilding: Arc::new(AtomicBool::new(false)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ask", post(handle_ask))
        .route("/search", post(handle_search))
        .route("/eligibility", post(handle_eligibility))
        .route("/admin/ingest", post(handle_ingest))
        .route("/admin/reindex", post(handle_reindex))
        .route("/status", get(handle_status))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Binds to `[server].bind` and serves until the process is terminated.
pub async fn run_server(engine: Arc<RagEngine>) -> anyhow::Result<()> {
    let bind_addr = engine.config().server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "server listening");
    println!("Sahayak server listening on http://{}", bind_addr);
    axum::serve(listener, router(engine)).await?;
    Ok(())
}

/// Start a rebuild in the background once the engine has flagged the
/// index. Queries keep using the current snapshot until the swap.
fn schedule_rebuild(state: &AppState) {
    if !state.engine.rebuild_required() || state.rebuilding.swap(true, Ordering::SeqCst) {
        return;
    }
    let engine = state.engine.clone();
    let rebuilding = state.rebuilding.clone();
    tokio::spawn(async move {
        info!("starting background index rebuild");
        if let Err(e) = engine.reindex().await {
            error!(error = %e, "background index rebuild failed");
        }
        rebuilding.store(false, Ordering::SeqCst);
    });
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn check_top_k(top_k: Option<usize>) -> Result<(), AppError> {
    match top_k {
        Some(k) if k == 0 || k > MAX_TOP_K => Err(bad_request(format!(
            "top_k must be in 1..={}",
            MAX_TOP_K
        ))),
        _ => Ok(()),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let status = match &err {
            RagError::Ingest { .. } => StatusCode::BAD_REQUEST,
            RagError::EmbeddingUnavailable { .. }
            | RagError::GenerationUnavailable { .. }
            | RagError::EmptyKnowledgeBase
            | RagError::IndexCorruption { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RagError::Storage(_) | RagError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<EligibilityError> for AppError {
    fn from(err: EligibilityError) -> Self {
        AppError {
            status: StatusCode::BAD_REQUEST,
            code: "invalid_profile".to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /status ============

async fn handle_status(State(state): State<AppState>) -> Result<Json<EngineStatus>, AppError> {
    Ok(Json(state.engine.status().await?))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    query: String,
    #[serde(default)]
    include_sources: Option<bool>,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    min_similarity: Option<f32>,
}

#[derive(Serialize)]
struct AskResponse {
    #[serde(flatten)]
    answered: AnsweredQuery,
    /// Lets a front-end offer the eligibility flow for loan questions.
    intent: Intent,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    check_top_k(req.top_k)?;

    let options = AskOptions {
        retrieve: RetrieveOptions {
            top_k: req.top_k,
            min_similarity: req.min_similarity,
        },
        include_sources: req.include_sources,
    };
    let answered = state.engine.ask_with(query, options).await;
    schedule_rebuild(&state);

    Ok(Json(AskResponse {
        intent: classify(query),
        answered,
    }))
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    min_similarity: Option<f32>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: RetrievalResult,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    check_top_k(req.top_k)?;

    let options = RetrieveOptions {
        top_k: req.top_k,
        min_similarity: req.min_similarity,
    };
    let result = state.engine.search(&req.query, options).await;
    schedule_rebuild(&state);
    Ok(Json(SearchResponse { results: result? }))
}

// ============ POST /eligibility ============

async fn handle_eligibility(
    Json(profile): Json<ApplicantProfile>,
) -> Result<Json<EligibilityResult>, AppError> {
    Ok(Json(evaluate(&profile)?))
}

// ============ POST /admin/ingest ============

#[derive(Deserialize)]
struct IngestRequest {
    /// A file or folder; the configured knowledge root when absent.
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default)]
    full: bool,
    #[serde(default)]
    prune: bool,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<FolderReport>, AppError> {
    let Some(path) = req.path else {
        return Ok(Json(state.engine.ingest_folder(None, req.full, req.prune).await?));
    };

    let meta = tokio::fs::metadata(&path)
        .await
        .map_err(|_| not_found(format!("no such file or folder: {}", path.display())))?;

    if meta.is_dir() {
        return Ok(Json(
            state
                .engine
                .ingest_folder(Some(&path), req.full, req.prune)
                .await?,
        ));
    }

    let report = state.engine.ingest_path(&path, req.full).await?;
    let mut folder = FolderReport {
        scanned: 1,
        ..FolderReport::default()
    };
    if report.status == IngestStatus::Unchanged {
        folder.unchanged = 1;
    } else {
        folder.indexed.push(report);
    }
    Ok(Json(folder))
}

// ============ POST /admin/reindex ============

async fn handle_reindex(State(state): State<AppState>) -> Result<Json<ReindexReport>, AppError> {
    Ok(Json(state.engine.reindex().await?))
}
