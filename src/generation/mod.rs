//! Generation boundary.
//!
//! A [`Generator`] turns a [`Prompt`] into answer text with a single
//! attempt; retries, timeouts and fallbacks belong to the answer
//! orchestrator. Implementations:
//! - **[`ChatCompletionsGenerator`]** — any OpenAI-compatible
//!   `/chat/completions` endpoint (Groq by default).
//! - **[`DisabledGenerator`]** — always unavailable; used when no provider
//!   is configured so the engine still answers with a fallback.

mod openai;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::error::{RagError, Result};
use crate::prompt::Prompt;

pub use openai::ChatCompletionsGenerator;

/// Sampling limits passed with every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl From<&GenerationConfig> for GenerationParams {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_id(&self) -> &str;

    /// Whether the generator can be called at all.
    fn is_available(&self) -> bool {
        true
    }

    /// One attempt. Unreachable or failing providers report
    /// [`RagError::GenerationUnavailable`], flagged retryable when a second
    /// attempt may succeed.
    async fn generate(&self, prompt: &Prompt, params: GenerationParams) -> Result<String>;
}

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_id(&self) -> &str {
        "disabled"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn generate(&self, _prompt: &Prompt, _params: GenerationParams) -> Result<String> {
        Err(RagError::generation("generation provider is disabled", false))
    }
}

/// Build the configured generator.
///
/// A missing API key is not an error: the engine keeps serving retrieval
/// and answers with the unavailable fallback.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(ChatCompletionsGenerator::new(config)?)),
        other => Err(RagError::Config(format!(
            "Unknown generation provider: '{}'",
            other
        ))),
    }
}
