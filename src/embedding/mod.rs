//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`HashEmbedder`]** — deterministic feature hashing; offline, no model download.
//! - **[`OpenAiEmbedder`]** — any OpenAI-compatible `/embeddings` endpoint (OpenAI, Ollama, vLLM).
//! - **`LocalEmbedder`** — fastembed models run in-process (feature `local-embeddings-fastembed`).
//!
//! Providers perform a single attempt per call. [`ResilientEmbedder`] wraps
//! any provider with batching, the bounded retry policy, a per-attempt
//! timeout, and response validation; [`create_embedder`] always returns a
//! wrapped provider.
//!
//! Also provides vector utilities:
//! - [`l2_normalize`] / [`dot`] — the index stores unit vectors and scores with the inner product
//! - [`cosine_similarity`] — similarity between two arbitrary vectors
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian `f32` BLOB encoding for SQLite
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: `backoff_base_ms`, doubling, capped at `backoff_max_ms`

mod hash;
#[cfg(feature = "local-embeddings-fastembed")]
mod local;
mod openai;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Boundary, RagError, Result};
use crate::retry::{call_with_retry, RetryPolicy};

pub use hash::HashEmbedder;
#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;
pub use openai::OpenAiEmbedder;

/// Maps text to fixed-dimension vectors under one model.
///
/// For a fixed [`model_id`](Embedder::model_id) the same text should map to
/// (approximately) the same vector. Implementations report an unreachable
/// boundary as [`RagError::EmbeddingUnavailable`].
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_id(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding("empty embedding response", false))
    }
}

/// Batching, retry, timeout, and validation around another [`Embedder`].
pub struct ResilientEmbedder {
    inner: Arc<dyn Embedder>,
    policy: RetryPolicy,
    timeout: Duration,
    batch_size: usize,
}

impl ResilientEmbedder {
    pub fn new(
        inner: Arc<dyn Embedder>,
        policy: RetryPolicy,
        timeout: Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            inner,
            policy,
            timeout,
            batch_size: batch_size.max(1),
        }
    }

    fn validate(&self, sent: usize, vectors: &[Vec<f32>]) -> Result<()> {
        if vectors.len() != sent {
            return Err(RagError::embedding(
                format!("expected {} vectors, got {}", sent, vectors.len()),
                false,
            ));
        }
        let dims = self.inner.dims();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(RagError::embedding(
                format!(
                    "model {} returned a {}-dim vector, expected {}",
                    self.inner.model_id(),
                    bad.len(),
                    dims
                ),
                false,
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for ResilientEmbedder {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let vectors = call_with_retry(&self.policy, Boundary::Embedding, self.timeout, || {
                self.inner.embed_batch(batch)
            })
            .await?;
            self.validate(batch.len(), &vectors)?;
            out.extend(vectors);
        }
        Ok(out)
    }
}

/// Create the configured provider, wrapped in a [`ResilientEmbedder`].
///
/// # Supported Providers
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"hash"` | [`HashEmbedder`] |
/// | `"openai"` | [`OpenAiEmbedder`] |
/// | `"local"` | `LocalEmbedder` (feature `local-embeddings-fastembed`) |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let inner: Arc<dyn Embedder> = match config.provider.as_str() {
        "hash" => Arc::new(HashEmbedder::new(
            config.dims.unwrap_or(hash::DEFAULT_DIMS),
        )),
        "openai" => Arc::new(OpenAiEmbedder::new(config)?),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Arc::new(LocalEmbedder::new(config)?),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => {
            return Err(RagError::Config(
                "Local embedding provider requires --features local-embeddings-fastembed"
                    .to_string(),
            ))
        }
        other => {
            return Err(RagError::Config(format!(
                "Unknown embedding provider: {}",
                other
            )))
        }
    };

    Ok(Arc::new(ResilientEmbedder::new(
        inner,
        config.retry_policy(),
        config.timeout(),
        config.batch_size,
    )))
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        return;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
}

/// Inner product; equals cosine similarity for unit vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use sahayak_rag::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors
/// of different lengths, and zero vectors.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
