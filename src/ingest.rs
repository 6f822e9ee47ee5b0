//! Document normalization, chunking and embedding for ingestion.
//!
//! Turns a [`SourceText`] into a versioned [`Document`], its [`Chunk`]s
//! and their [`Embedding`]s. Nothing here touches the store or the index;
//! [`RagEngine`](crate::engine::RagEngine) commits the prepared set to both
//! so that a failure at any step leaves the previous version in place.

use chrono::Utc;
use serde::Serialize;

use crate::chunk::{chunk_text, document_id};
use crate::config::ChunkingConfig;
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::models::{Chunk, Document, Embedding, SourceText};

/// A document ready to be committed.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub document: Document,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// A new version was stored and indexed.
    Indexed,
    /// Content unchanged since the last ingest; nothing was done.
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub source_path: String,
    pub document_id: String,
    pub version: u32,
    pub chunks: usize,
    pub status: IngestStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestFailure {
    pub source_path: String,
    pub error: String,
}

/// Outcome of a folder ingest. Per-file failures do not abort the run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FolderReport {
    pub scanned: usize,
    pub indexed: Vec<IngestReport>,
    pub unchanged: usize,
    pub removed: Vec<String>,
    pub failed: Vec<IngestFailure>,
}

/// Line endings unified to `\n` and NUL characters dropped.
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").replace('\0', "")
}

/// Normalize, validate and chunk a source.
///
/// Fails with [`RagError::Ingest`] when the text is blank or chunking
/// produces nothing.
pub fn prepare_document(
    source: &SourceText,
    version: u32,
    chunking: &ChunkingConfig,
) -> Result<PreparedDocument> {
    let raw_text = normalize_text(&source.text);
    if raw_text.trim().is_empty() {
        return Err(RagError::ingest(&source.source_path, "document is empty"));
    }

    let id = document_id(&source.source_path, &raw_text);
    let chunks = chunk_text(&id, &source.source_path, &raw_text, chunking);
    if chunks.is_empty() {
        return Err(RagError::ingest(&source.source_path, "chunking produced no chunks"));
    }

    Ok(PreparedDocument {
        document: Document {
            id,
            source_path: source.source_path.clone(),
            content_type: source.content_type.clone(),
            raw_text,
            version,
            ingested_at: Utc::now(),
        },
        chunks,
    })
}

/// Embed every chunk, preserving order.
pub async fn embed_chunks(embedder: &dyn Embedder, chunks: &[Chunk]) -> Result<Vec<Embedding>> {
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed_batch(&texts).await?;
    if vectors.len() != chunks.len() {
        return Err(RagError::embedding(
            format!("expected {} vectors, got {}", chunks.len(), vectors.len()),
            false,
        ));
    }

    let created_at = Utc::now();
    Ok(chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| Embedding {
            chunk_id: chunk.id.clone(),
            vector,
            model_id: embedder.model_id().to_string(),
            created_at,
        })
        .collect())
}
