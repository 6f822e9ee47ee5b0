//! Prompt construction.
//!
//! Pure functions from the question and assembled context to the messages
//! sent to the generation boundary. Nothing here performs I/O.

use serde::Serialize;

use crate::models::AssembledContext;

const GROUNDED_SYSTEM: &str = "You are Sahayak, a helpful banking and government-scheme assistant \
for rural India. Answer ONLY from the reference context supplied with the question. \
If the context does not contain the answer, say plainly that you do not have enough \
information. Do not invent figures, rates or scheme rules. Keep answers short and simple, \
and cite the markers (for example [S1]) of the context sections you used.";

const NO_CONTEXT_SYSTEM: &str = "You are Sahayak, a helpful banking and government-scheme \
assistant for rural India. No reference material was found for this question. Say so \
first, then give at most a brief general pointer, and suggest contacting the bank or the \
official scheme portal for exact details. Do not invent figures, rates or scheme rules.";

/// A system and a user message for a chat-completions style generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

pub fn build_prompt(query: &str, context: &AssembledContext) -> Prompt {
    let user = format!(
        "Reference context:\n{}\n\nQuestion: {}\n\n\
         Answer using only the reference context above. If it is insufficient, say so.",
        context.text,
        query.trim()
    );
    Prompt {
        system: GROUNDED_SYSTEM.to_string(),
        user,
    }
}

pub fn build_prompt_without_context(query: &str) -> Prompt {
    Prompt {
        system: NO_CONTEXT_SYSTEM.to_string(),
        user: format!("Question: {}", query.trim()),
    }
}

/// Question used by `explain_term`.
pub fn term_question(term: &str) -> String {
    format!(
        "Explain the banking or financial term \"{}\" in simple language, with a short example.",
        term.trim()
    )
}

/// Question used by `explain_scheme`.
pub fn scheme_question(name: &str) -> String {
    format!(
        "Explain the government scheme \"{}\": who it is for, its benefits, eligibility and how to apply.",
        name.trim()
    )
}
