//! OpenAI-compatible chat-completions client.
//!
//! Calls `POST {base_url}/chat/completions`. The default base URL points at
//! Groq; OpenAI, Ollama's `/v1` and vLLM speak the same shape. The API key
//! comes from the environment variable named by `generation.api_key_env`.

use async_trait::async_trait;
use std::time::Duration;

use super::{GenerationParams, Generator};
use crate::config::GenerationConfig;
use crate::error::{RagError, Result};
use crate::prompt::Prompt;

pub struct ChatCompletionsGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl ChatCompletionsGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.saturating_add(5)))
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    /// Point at an explicit endpoint and key, bypassing the environment.
    pub fn with_endpoint(mut self, base_url: &str, api_key: Option<String>) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self.api_key = api_key;
        self
    }

    fn is_local(&self) -> bool {
        self.base_url.contains("://127.0.0.1") || self.base_url.contains("://localhost")
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some() || self.is_local()
    }

    async fn generate(&self, prompt: &Prompt, params: GenerationParams) -> Result<String> {
        if !self.is_available() {
            return Err(RagError::generation("API key not configured", false));
        }

        let mut messages = Vec::with_capacity(2);
        if !prompt.system.is_empty() {
            messages.push(serde_json::json!({"role": "system", "content": prompt.system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": prompt.user}));

        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "top_p": 0.9,
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RagError::generation(format!("connection error: {}", e), true))?;

        let status = response.status();
        if status.is_success() {
            let json: serde_json::Value = response
                .json()
                .await
                .map_err(|e| RagError::generation(format!("invalid JSON: {}", e), true))?;
            return parse_completion(&json);
        }

        let body_text = response.text().await.unwrap_or_default();
        let retryable = status.as_u16() == 429 || status.is_server_error();
        Err(RagError::generation(
            format!("API error {}: {}", status, body_text),
            retryable,
        ))
    }
}

/// Extract `choices[0].message.content`. Blank content counts as a
/// transient failure: an empty answer is never passed on.
fn parse_completion(json: &serde_json::Value) -> Result<String> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| RagError::generation("invalid response: missing message content", false))?;

    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(RagError::generation("provider returned an empty answer", true));
    }
    Ok(trimmed.to_string())
}
