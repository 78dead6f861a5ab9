//! Core data types shared across the chat pipeline.
//!
//! These types carry conversation turns, composed prompt messages, and
//! retrieval output between the history buffer, the retrieval gate, the
//! prompt composer, and the generation client.

/// Who authored a message.
///
/// Roles stay in this closed set everywhere inside the service; the mapping
/// to the remote API's role vocabulary happens only at the wire boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation turn held in the history buffer.
#[derive(Debug, Clone)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One message in a composed prompt, in the order it is sent upstream.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// What the retrieval step produced for one query.
///
/// `context` is the passage text block injected into the prompt; `sources`
/// are the citation labels appended to a successful reply, deduplicated in
/// first-seen order and capped. Both empty when retrieval was skipped or
/// found nothing.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub context: String,
    pub sources: Vec<String>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.context.is_empty()
    }
}

/// A stored knowledge-base passage.
#[derive(Debug, Clone)]
pub struct Passage {
    pub id: String,
    pub document_id: String,
    pub seq: i64,
    pub text: String,
    pub hash: String,
}

/// A passage scored against a query.
#[derive(Debug, Clone)]
pub struct ScoredPassage {
    pub text: String,
    pub file_name: String,
    pub score: f32,
}
