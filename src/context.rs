//! Prompt context assembly.
//!
//! Retrieved chunks are packed in descending similarity order, each under a
//! provenance marker line:
//!
//! ```text
//! [S1] schemes/mudra.txt #0
//! <chunk text>
//!
//! [S2] emi.md #3
//! <chunk text>
//! ```
//!
//! Packing is greedy and stops at the first chunk that would push the token
//! estimate past `max_context_tokens`. Chunks are included whole or not at
//! all, and a chunk whose text hash was already included is skipped.

use std::collections::HashSet;

use crate::chunk::estimate_tokens;
use crate::models::{AssembledContext, Citation, RetrievalResult};

const SEPARATOR: &str = "\n\n";

/// Marker label for the `n`th included chunk (1-based).
pub fn marker(n: usize) -> String {
    format!("S{}", n)
}

pub fn assemble(retrieval: &RetrievalResult, max_context_tokens: usize) -> AssembledContext {
    let mut text = String::new();
    let mut citations: Vec<Citation> = Vec::new();
    let mut seen_hashes: HashSet<&str> = HashSet::new();
    let mut budget_used = 0usize;

    for hit in retrieval.iter() {
        let chunk = &hit.chunk;
        if seen_hashes.contains(chunk.hash.as_str()) {
            continue;
        }

        let label = marker(citations.len() + 1);
        let section = format!(
            "[{}] {} #{}\n{}",
            label, chunk.source_path, chunk.ordinal, chunk.text
        );
        let separator = if text.is_empty() { "" } else { SEPARATOR };
        // Sum of per-piece ceilings bounds the estimate of the whole text.
        let cost = estimate_tokens(separator) + estimate_tokens(&section);
        if budget_used + cost > max_context_tokens {
            break;
        }

        budget_used += cost;
        text.push_str(separator);
        text.push_str(&section);
        seen_hashes.insert(chunk.hash.as_str());
        citations.push(Citation {
            marker: label,
            chunk_id: chunk.id.clone(),
            document_id: chunk.document_id.clone(),
            source_path: chunk.source_path.clone(),
            ordinal: chunk.ordinal,
            score: hit.score,
        });
    }

    let token_estimate = estimate_tokens(&text);
    AssembledContext {
        text,
        citations,
        token_estimate,
    }
}
