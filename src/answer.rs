//! Answer orchestration around the generation boundary.
//!
//! Given a question and its assembled context, [`AnswerGenerator`] builds
//! the prompt, calls the [`Generator`] under the configured timeout and
//! retry budget (by default one retry with identical input), and always
//! comes back with text:
//!
//! | Situation | Outcome | Text |
//! |-----------|---------|------|
//! | Context present, generator succeeds | `Grounded` | model answer (+ sources footer) |
//! | No context, policy `fallback` | `NoContext` | `no_context_message` |
//! | No context, policy `generate_without_context`, generator succeeds | `WithoutContext` | model answer |
//! | Generator still failing after the budget | `Unavailable` | `unavailable_message` |
//!
//! Errors never escape this module; they are logged and mapped to a
//! fallback.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{EmptyContextPolicy, GenerationConfig};
use crate::error::Boundary;
use crate::generation::{GenerationParams, Generator};
use crate::models::{AnswerOutcome, AssembledContext, Citation, GeneratedAnswer};
use crate::prompt::{build_prompt, build_prompt_without_context, Prompt};
use crate::retry::call_with_retry;

pub struct AnswerGenerator {
    generator: Arc<dyn Generator>,
    config: GenerationConfig,
}

impl AnswerGenerator {
    pub fn new(generator: Arc<dyn Generator>, config: GenerationConfig) -> Self {
        Self { generator, config }
    }

    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.generator
    }

    pub async fn answer(&self, query: &str, context: &AssembledContext) -> GeneratedAnswer {
        self.answer_with(query, context, self.config.include_sources)
            .await
    }

    pub async fn answer_with(
        &self,
        query: &str,
        context: &AssembledContext,
        include_sources: bool,
    ) -> GeneratedAnswer {
        if context.is_empty() {
            return match self.config.on_empty_context {
                EmptyContextPolicy::Fallback => self.fallback(AnswerOutcome::NoContext),
                EmptyContextPolicy::GenerateWithoutContext => {
                    let prompt = build_prompt_without_context(query);
                    match self.generate(&prompt).await {
                        Some(text) => GeneratedAnswer {
                            answer_text: text,
                            citations_used: Vec::new(),
                            outcome: AnswerOutcome::WithoutContext,
                        },
                        None => self.fallback(AnswerOutcome::Unavailable),
                    }
                }
            };
        }

        let prompt = build_prompt(query, context);
        let Some(text) = self.generate(&prompt).await else {
            return self.fallback(AnswerOutcome::Unavailable);
        };

        let citations_used = citations_used(&text, &context.citations);
        let answer_text = if include_sources {
            append_sources(text, &context.citations)
        } else {
            text
        };
        GeneratedAnswer {
            answer_text,
            citations_used,
            outcome: AnswerOutcome::Grounded,
        }
    }

    /// `None` once the retry budget is spent or on a permanent failure.
    async fn generate(&self, prompt: &Prompt) -> Option<String> {
        let params = GenerationParams::from(&self.config);
        let result = call_with_retry(
            &self.config.retry_policy(),
            Boundary::Generation,
            self.config.timeout(),
            || self.generator.generate(prompt, params),
        )
        .await;

        match result {
            Ok(text) => {
                info!(model = self.generator.model_id(), chars = text.len(), "generated answer");
                Some(text)
            }
            Err(e) => {
                warn!(model = self.generator.model_id(), error = %e, "generation failed, using fallback");
                None
            }
        }
    }

    /// The deterministic answer for `NoContext` or `Unavailable`.
    pub fn fallback(&self, outcome: AnswerOutcome) -> GeneratedAnswer {
        let answer_text = match outcome {
            AnswerOutcome::Unavailable => self.config.unavailable_message.clone(),
            _ => self.config.no_context_message.clone(),
        };
        GeneratedAnswer {
            answer_text,
            citations_used: Vec::new(),
            outcome,
        }
    }
}

/// Best-effort: a citation counts as used when its bracketed marker or its
/// source file name appears in the answer.
pub fn citations_used(answer: &str, citations: &[Citation]) -> Vec<Citation> {
    let lowered = answer.to_lowercase();
    citations
        .iter()
        .filter(|c| {
            let marker = format!("[{}]", c.marker).to_lowercase();
            let file_name = c
                .source_path
                .rsplit('/')
                .next()
                .unwrap_or(&c.source_path)
                .to_lowercase();
            lowered.contains(&marker) || (!file_name.is_empty() && lowered.contains(&file_name))
        })
        .cloned()
        .collect()
}

/// Append `Sources: a.txt, b.pdf` listing distinct sources in citation order.
pub fn append_sources(mut answer: String, citations: &[Citation]) -> String {
    let mut sources: Vec<&str> = Vec::new();
    for c in citations {
        if !sources.contains(&c.source_path.as_str()) {
            sources.push(&c.source_path);
        }
    }
    if !sources.is_empty() {
        answer.push_str("\n\nSources: ");
        answer.push_str(&sources.join(", "));
    }
    answer
}
