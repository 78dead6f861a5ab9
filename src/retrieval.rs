//! Keyword-gated knowledge-base retrieval.
//!
//! Generic chatter never pays the retrieval cost: a query consults the index
//! only when it mentions one of the fixed domain keywords. Retrieval
//! failures degrade to an empty result; the chat flow never sees an error
//! from here.

use tracing::debug;

use crate::config::KnowledgeConfig;
use crate::index::PassageIndex;
use crate::models::RetrievalResult;

/// Queries containing any of these (case-insensitive substring match) are
/// routed through the knowledge base.
pub const DOMAIN_KEYWORDS: &[&str] = &[
    "terapi",
    "psikoloji",
    "bdt",
    "mindfulness",
    "anksiyete",
    "depresyon",
    "stres",
    "kaygı",
    "farkındalık",
    "nefes",
    "meditasyon",
    "ego",
    "bilinçaltı",
    "travma",
    "obsesif",
    "panik",
    "fobi",
    "öfke",
];

pub fn is_domain_query(query: &str) -> bool {
    let lowered = query.to_lowercase();
    DOMAIN_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

/// A `&str` prefix of at most `max_chars` characters, never splitting a
/// UTF-8 code point.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Runs the gated retrieval step for one query.
///
/// Returns an empty result when there is no index, the query carries no
/// domain keyword, the lookup fails, or nothing matches. Passage texts are
/// clipped to `passage_chars` and joined with blank lines; source labels
/// are deduplicated in first-seen order and capped at `max_sources`.
pub async fn maybe_retrieve(
    index: Option<&dyn PassageIndex>,
    config: &KnowledgeConfig,
    query: &str,
) -> RetrievalResult {
    let Some(index) = index else {
        return RetrievalResult::default();
    };
    if !is_domain_query(query) {
        return RetrievalResult::default();
    }

    let hits = match index.top_passages(query, config.top_k).await {
        Ok(hits) => hits,
        Err(err) => {
            debug!(error = %err, "knowledge lookup failed, answering without context");
            return RetrievalResult::default();
        }
    };
    if hits.is_empty() {
        return RetrievalResult::default();
    }

    let context = hits
        .iter()
        .map(|hit| truncate_chars(&hit.text, config.passage_chars))
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut sources = Vec::new();
    for hit in &hits {
        let label = format!("📚 {}", hit.file_name);
        if !sources.contains(&label) {
            sources.push(label);
            if sources.len() == config.max_sources {
                break;
            }
        }
    }

    RetrievalResult { context, sources }
}
