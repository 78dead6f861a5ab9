//! Paragraph-boundary passage splitter.
//!
//! Splits extracted document text into [`Passage`]s that respect a
//! `max_tokens` budget. Splitting happens on paragraph boundaries (`\n\n`)
//! so each stored passage stays coherent enough to embed and quote.
//!
//! Each passage carries a fresh UUID and a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Passage;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split text into passages on paragraph boundaries, respecting max_tokens.
/// Returns passages with contiguous sequence numbers starting at 0; text
/// with no content yields no passages.
pub fn split_passages(document_id: &str, text: &str, max_tokens: usize) -> Vec<Passage> {
    let max_chars = max_tokens * CHARS_PER_TOKEN;

    let paragraphs: Vec<&str> = text.split("\n\n").collect();
    let mut passages = Vec::new();
    let mut current_buf = String::new();
    let mut seq: i64 = 0;

    for para in paragraphs {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        // If adding this paragraph would exceed max, flush current buffer
        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len() // +2 for \n\n separator
        };

        if would_be > max_chars && !current_buf.is_empty() {
            passages.push(make_passage(document_id, seq, &current_buf));
            seq += 1;
            current_buf.clear();
        }

        // If a single paragraph exceeds max, hard-split it
        if trimmed.len() > max_chars {
            if !current_buf.is_empty() {
                passages.push(make_passage(document_id, seq, &current_buf));
                seq += 1;
                current_buf.clear();
            }
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let mut split_at = remaining.len().min(max_chars);
                // max_chars is a byte count and can land inside a
                // multi-byte character; back up to the nearest boundary.
                while !remaining.is_char_boundary(split_at) {
                    split_at -= 1;
                }
                // Prefer a newline or space boundary over a mid-word cut
                let actual_split = if split_at < remaining.len() {
                    remaining[..split_at]
                        .rfind('\n')
                        .or_else(|| remaining[..split_at].rfind(' '))
                        .map(|pos| pos + 1)
                        .unwrap_or(split_at)
                } else {
                    split_at
                };
                let piece = &remaining[..actual_split];
                passages.push(make_passage(document_id, seq, piece.trim()));
                seq += 1;
                remaining = &remaining[actual_split..];
            }
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        passages.push(make_passage(document_id, seq, &current_buf));
    }

    passages
}

fn make_passage(document_id: &str, seq: i64, text: &str) -> Passage {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Passage {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        seq,
        text: text.to_string(),
        hash,
    }
}
