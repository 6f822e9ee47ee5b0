//! OpenAI-compatible embeddings client.
//!
//! Calls `POST {base_url}/embeddings` with the configured model. Works with
//! the OpenAI API and with servers exposing the same shape (Ollama's `/v1`,
//! vLLM, LM Studio). The API key is read from the environment variable
//! named by `embedding.api_key_env`; it is optional for local servers.

use async_trait::async_trait;
use std::time::Duration;

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
    api_key: Option<String>,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| RagError::Config("embedding.model required for openai".to_string()))?;
        let dims = config
            .dims
            .ok_or_else(|| RagError::Config("embedding.dims required for openai".to_string()))?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() && base_url == DEFAULT_BASE_URL {
            return Err(RagError::Config(format!(
                "{} environment variable not set",
                config.api_key_env
            )));
        }

        // Per-attempt timeouts are enforced by the retry layer; this one
        // only guards against a stuck connection outliving it.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.saturating_add(5)))
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            dims,
            api_key,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RagError::embedding(format!("connection error: {}", e), true))?;

        let status = response.status();
        if status.is_success() {
            let json: serde_json::Value = response
                .json()
                .await
                .map_err(|e| RagError::embedding(format!("invalid JSON: {}", e), true))?;
            return parse_embeddings_response(&json);
        }

        let body_text = response.text().await.unwrap_or_default();
        let retryable = status.as_u16() == 429 || status.is_server_error();
        Err(RagError::embedding(
            format!("API error {}: {}", status, body_text),
            retryable,
        ))
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| RagError::embedding("invalid response: missing data array", false))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| RagError::embedding("invalid response: missing embedding", false))?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(i, _)| *i);
    // Every input position must appear exactly once.
    if let Some((expected, (index, _))) = indexed.iter().enumerate().find(|(p, (i, _))| p != i) {
        return Err(RagError::embedding(
            format!(
                "invalid response: embedding index {} where {} was expected",
                index, expected
            ),
            false,
        ));
    }
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}
