//! # Sahayak RAG
//!
//! Grounded question answering over a curated financial-literacy knowledge
//! base, plus a deterministic loan eligibility and EMI evaluator.
//!
//! Documents are normalized, chunked, embedded and stored in SQLite; an
//! in-memory vector index is rebuilt from the stored embeddings at startup.
//! Each question is embedded, matched against the index, packed into a
//! token-budgeted context and answered by a chat-completions model, with a
//! deterministic fallback whenever there is nothing to ground on or the
//! model stays unavailable after one retry.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────┐
//! │ Knowledge dir│──▶│ Chunk+Embed  │──▶│  SQLite   │
//! │ txt/md/pdf/… │   │              │   │ docs+vecs │
//! └──────────────┘   └──────┬───────┘   └─────┬─────┘
//!                           ▼                 │ startup
//!                    ┌──────────────┐◀────────┘
//!                    │ VectorIndex  │
//!                    └──────┬───────┘
//!        question ─▶ Retriever ─▶ Context ─▶ AnswerGenerator ─▶ answer
//!                           │
//!                  ┌────────┴────────┐
//!                  ▼                 ▼
//!             ┌──────────┐     ┌──────────┐
//!             │   CLI    │     │   HTTP   │
//!             │(sahayak) │     │  (axum)  │
//!             └──────────┘     └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sahayak init
//! sahayak ingest                 # scan [knowledge].root
//! sahayak ask "How is EMI calculated?"
//! sahayak eligibility --income-annum 600000 --loan-amount 1000000 \
//!     --loan-term 10 --cibil-score 780
//! sahayak serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`scan`] | Knowledge folder scanning |
//! | [`extract`] | Text extraction from txt, md, pdf and docx |
//! | [`chunk`] | Character-window chunking and content ids |
//! | [`ingest`] | Normalization and document preparation |
//! | [`embedding`] | Embedding providers |
//! | [`retry`] | Bounded retry with per-attempt timeouts |
//! | [`store`] | Durable document, chunk and embedding storage |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`index`] | Copy-on-write vector index |
//! | [`retriever`] | Query embedding, search and filtering |
//! | [`context`] | Token-budgeted context assembly |
//! | [`prompt`] | Prompt construction |
//! | [`generation`] | Chat-completion providers |
//! | [`answer`] | Answer orchestration and fallbacks |
//! | [`engine`] | Ingestion, index lifecycle and the query pipeline |
//! | [`intent`] | Query intent classification |
//! | [`eligibility`] | Loan eligibility and EMI |
//! | [`server`] | HTTP server |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod context;
pub mod db;
pub mod eligibility;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod intent;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod retriever;
pub mod retry;
pub mod scan;
pub mod server;
pub mod store;
