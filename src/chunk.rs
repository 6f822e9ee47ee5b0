//! Sliding-window text chunker.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size` characters
//! with a fixed `chunk_overlap`. Windows are measured in Unicode scalar
//! values so multi-byte scripts (Devanagari, Gurmukhi, …) are never cut
//! inside a code point.
//!
//! A window prefers to end just after whitespace, as long as that still
//! moves past the overlap; otherwise it is cut hard at `chunk_size`.
//! Chunk `i + 1` always starts exactly `chunk_overlap` characters before
//! chunk `i` ends, so the chunks cover the whole text and dropping the
//! first `chunk_overlap` characters of every chunk after the first
//! reconstructs it exactly. Chunk text is never trimmed.
//!
//! Document and chunk IDs are derived from content with SHA-256, so the
//! same input always yields the same IDs.

use sha2::{Digest, Sha256};

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Approximate chars-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Token estimate used for chunk sizes and the context budget.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Content-derived document ID.
pub fn document_id(source_path: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    short_hex(hasher)
}

fn chunk_id(document_id: &str, ordinal: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update((ordinal as u64).to_le_bytes());
    short_hex(hasher)
}

/// SHA-256 of a text, full hex.
pub fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn short_hex(hasher: Sha256) -> String {
    let hex = format!("{:x}", hasher.finalize());
    hex[..32].to_string()
}

/// Split `text` into chunks. Returns an empty vector for empty text;
/// the caller decides whether that is an error.
pub fn chunk_text(
    document_id: &str,
    source_path: &str,
    text: &str,
    config: &ChunkingConfig,
) -> Vec<Chunk> {
    let max_chars = config.chunk_size.max(1);
    let overlap = config.chunk_overlap.min(max_chars - 1);

    // Byte offset of every char boundary, plus the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = bounds.len() - 1;

    let mut chunks = Vec::new();
    if total == 0 {
        return chunks;
    }

    let mut start = 0usize;
    loop {
        let hard_end = (start + max_chars).min(total);
        let end = if hard_end < total {
            snap_to_whitespace(text, &bounds, start + overlap, hard_end)
        } else {
            hard_end
        };

        let piece = &text[bounds[start]..bounds[end]];
        chunks.push(make_chunk(
            document_id,
            source_path,
            chunks.len(),
            start,
            piece,
        ));

        if end == total {
            break;
        }
        start = end - overlap;
    }

    chunks
}

/// Largest `j` in `(floor, hard_end]` whose preceding char is whitespace,
/// or `hard_end` when there is none.
fn snap_to_whitespace(text: &str, bounds: &[usize], floor: usize, hard_end: usize) -> usize {
    let mut j = hard_end;
    while j > floor {
        let prev = &text[bounds[j - 1]..bounds[j]];
        if prev.chars().all(char::is_whitespace) {
            return j;
        }
        j -= 1;
    }
    hard_end
}

fn make_chunk(
    document_id: &str,
    source_path: &str,
    ordinal: usize,
    start_char: usize,
    text: &str,
) -> Chunk {
    Chunk {
        id: chunk_id(document_id, ordinal),
        document_id: document_id.to_string(),
        source_path: source_path.to_string(),
        ordinal,
        start_char,
        text: text.to_string(),
        token_count: estimate_tokens(text),
        hash: text_hash(text),
    }
}
