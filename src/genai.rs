//! Gemini generation client with classified errors and bounded retry.
//!
//! [`GenerationApi`] is one attempt against the model; [`generate`] wraps it
//! in the retry policy: transient faults (HTTP 503) back off exponentially
//! and try again, everything else returns at once. Sleeping goes through the
//! [`Delay`] seam so the policy can run under test without waiting.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{error, warn};

use crate::config::GenerationConfig;
use crate::models::{ChatMessage, Role};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// The four harm categories, all pinned to the configured threshold.
const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// A failed generation attempt, classified for the retry policy.
#[derive(Debug)]
pub enum GenaiError {
    /// HTTP 503; the only class worth retrying.
    Unavailable { detail: String },
    /// Any other upstream rejection: bad key, malformed request, quota.
    Http { status: u16, detail: String },
    /// The request never produced an HTTP response.
    Transport(String),
    /// A 2xx whose payload could not be read as JSON.
    Protocol(String),
}

impl GenaiError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GenaiError::Unavailable { .. })
    }
}

impl std::fmt::Display for GenaiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenaiError::Unavailable { detail } => {
                write!(f, "model temporarily unavailable: {}", detail)
            }
            GenaiError::Http { status, detail } => {
                write!(f, "generation API error {}: {}", status, detail)
            }
            GenaiError::Transport(e) => write!(f, "request failed: {}", e),
            GenaiError::Protocol(e) => write!(f, "unreadable response payload: {}", e),
        }
    }
}

impl std::error::Error for GenaiError {}

/// Final result of a generation call, after the retry policy ran.
#[derive(Debug)]
pub enum GenerationOutcome {
    /// A non-empty reply.
    Answered(String),
    /// The model responded but carried no usable text (safety filtering).
    Empty,
    /// Transient failures persisted through every attempt.
    Unavailable(GenaiError),
    /// A permanent failure; more attempts would not have helped.
    Failed(GenaiError),
}

/// One attempt against a generation backend.
///
/// `Ok(None)` is a completed call that produced no usable text.
#[async_trait]
pub trait GenerationApi: Send + Sync {
    async fn request(&self, messages: &[ChatMessage]) -> Result<Option<String>, GenaiError>;
}

/// Sleep seam for the retry policy.
#[async_trait]
pub trait Delay: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production delay backed by the tokio timer.
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Runs the retry policy around one logical generation call.
///
/// Up to `max_attempts` attempts. After the n-th transient failure the next
/// attempt waits `backoff_base_secs * 2^n` seconds (1s then 2s with the
/// defaults); there is no sleep after the final attempt. Permanent failures
/// and empty candidates return after exactly one attempt.
pub async fn generate(
    api: &dyn GenerationApi,
    delay: &dyn Delay,
    config: &GenerationConfig,
    messages: &[ChatMessage],
) -> GenerationOutcome {
    let mut last_err = None;

    for attempt in 0..config.max_attempts {
        match api.request(messages).await {
            Ok(Some(text)) => return GenerationOutcome::Answered(text),
            Ok(None) => return GenerationOutcome::Empty,
            Err(err) if err.is_transient() => {
                warn!(attempt = attempt + 1, error = %err, "generation attempt failed");
                if attempt + 1 < config.max_attempts {
                    let wait = Duration::from_secs(config.backoff_base_secs << attempt.min(5));
                    delay.sleep(wait).await;
                }
                last_err = Some(err);
            }
            Err(err) => {
                error!(error = %err, "generation failed");
                return GenerationOutcome::Failed(err);
            }
        }
    }

    let err = last_err.unwrap_or(GenaiError::Unavailable {
        detail: "no attempts were made".to_string(),
    });
    warn!(attempts = config.max_attempts, error = %err, "generation unavailable, giving up");
    GenerationOutcome::Unavailable(err)
}

// ============ Gemini client ============

/// Client for the hosted `generateContent` endpoint.
pub struct GeminiApi {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    config: GenerationConfig,
}

impl GeminiApi {
    pub fn new(api_key: String, config: &GenerationConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl GenerationApi for GeminiApi {
    async fn request(&self, messages: &[ChatMessage]) -> Result<Option<String>, GenaiError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.config.model, self.api_key
        );
        let body = build_request_body(&self.config, messages);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenaiError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), detail));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenaiError::Protocol(e.to_string()))?;

        Ok(parse_candidate_text(&json))
    }
}

fn classify_status(status: u16, detail: String) -> GenaiError {
    match status {
        503 => GenaiError::Unavailable { detail },
        _ => GenaiError::Http { status, detail },
    }
}

/// The endpoint has no system slot in `contents`; standing instructions
/// travel as a leading user-role message.
fn wire_role(role: Role) -> &'static str {
    match role {
        Role::Assistant => "model",
        Role::System | Role::User => "user",
    }
}

fn build_request_body(config: &GenerationConfig, messages: &[ChatMessage]) -> serde_json::Value {
    let contents: Vec<serde_json::Value> = messages
        .iter()
        .map(|message| {
            serde_json::json!({
                "role": wire_role(message.role),
                "parts": [ { "text": message.content } ],
            })
        })
        .collect();

    let safety_settings: Vec<serde_json::Value> = SAFETY_CATEGORIES
        .iter()
        .map(|category| {
            serde_json::json!({
                "category": category,
                "threshold": config.safety_threshold,
            })
        })
        .collect();

    serde_json::json!({
        "contents": contents,
        "generationConfig": {
            "temperature": config.temperature,
            "topP": config.top_p,
            "topK": config.top_k,
            "maxOutputTokens": config.max_output_tokens,
        },
        "safetySettings": safety_settings,
    })
}

/// Pulls the first candidate's text out of a `generateContent` response.
///
/// A 200 without candidates (or with empty parts) is how the API reports a
/// fully filtered reply; that is `None`, not a protocol error.
fn parse_candidate_text(json: &serde_json::Value) -> Option<String> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|first| first.pointer("/content/parts"))
        .and_then(|p| p.as_array())?;

    let mut text = String::new();
    for part in parts {
        if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
            text.push_str(t);
        }
    }

    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedApi {
        replies: Mutex<VecDeque<Result<Option<String>, GenaiError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedApi {
        fn new(replies: Vec<Result<Option<String>, GenaiError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationApi for ScriptedApi {
        async fn request(&self, _messages: &[ChatMessage]) -> Result<Option<String>, GenaiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("scripted api ran out of replies")
        }
    }

    struct RecordingDelay {
        slept: Mutex<Vec<Duration>>,
    }

    impl RecordingDelay {
        fn new() -> Self {
            Self {
                slept: Mutex::new(Vec::new()),
            }
        }

        fn slept(&self) -> Vec<Duration> {
            self.slept.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Delay for RecordingDelay {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    fn unavailable() -> GenaiError {
        GenaiError::Unavailable {
            detail: "503".to_string(),
        }
    }

    fn prompt() -> Vec<ChatMessage> {
        vec![ChatMessage::user("merhaba")]
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let api = ScriptedApi::new(vec![Ok(Some("selam!".to_string()))]);
        let delay = RecordingDelay::new();
        let outcome = generate(&api, &delay, &GenerationConfig::default(), &prompt()).await;
        assert!(matches!(outcome, GenerationOutcome::Answered(ref t) if t == "selam!"));
        assert_eq!(api.calls(), 1);
        assert!(delay.slept().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let api = ScriptedApi::new(vec![
            Err(unavailable()),
            Err(unavailable()),
            Ok(Some("geldim".to_string())),
        ]);
        let delay = RecordingDelay::new();
        let outcome = generate(&api, &delay, &GenerationConfig::default(), &prompt()).await;
        assert!(matches!(outcome, GenerationOutcome::Answered(ref t) if t == "geldim"));
        assert_eq!(api.calls(), 3);
        assert_eq!(
            delay.slept(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_exhausted_retries() {
        let api = ScriptedApi::new(vec![
            Err(unavailable()),
            Err(unavailable()),
            Err(unavailable()),
        ]);
        let delay = RecordingDelay::new();
        let outcome = generate(&api, &delay, &GenerationConfig::default(), &prompt()).await;
        assert!(matches!(outcome, GenerationOutcome::Unavailable(_)));
        assert_eq!(api.calls(), 3);
        // No sleep after the last attempt.
        assert_eq!(
            delay.slept(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let api = ScriptedApi::new(vec![Err(GenaiError::Http {
            status: 429,
            detail: "quota".to_string(),
        })]);
        let delay = RecordingDelay::new();
        let outcome = generate(&api, &delay, &GenerationConfig::default(), &prompt()).await;
        assert!(matches!(outcome, GenerationOutcome::Failed(_)));
        assert_eq!(api.calls(), 1);
        assert!(delay.slept().is_empty());
    }

    #[tokio::test]
    async fn test_empty_candidate_is_terminal() {
        let api = ScriptedApi::new(vec![Ok(None)]);
        let delay = RecordingDelay::new();
        let outcome = generate(&api, &delay, &GenerationConfig::default(), &prompt()).await;
        assert!(matches!(outcome, GenerationOutcome::Empty));
        assert_eq!(api.calls(), 1);
        assert!(delay.slept().is_empty());
    }

    #[test]
    fn test_only_503_is_transient() {
        assert!(classify_status(503, String::new()).is_transient());
        for status in [400, 401, 403, 404, 429, 500, 502] {
            assert!(
                !classify_status(status, String::new()).is_transient(),
                "status {} must be permanent",
                status
            );
        }
        assert!(!GenaiError::Transport("timeout".to_string()).is_transient());
        assert!(!GenaiError::Protocol("bad json".to_string()).is_transient());
    }

    #[test]
    fn test_wire_role_mapping() {
        assert_eq!(wire_role(Role::User), "user");
        assert_eq!(wire_role(Role::System), "user");
        assert_eq!(wire_role(Role::Assistant), "model");
    }

    #[test]
    fn test_build_request_body() {
        let config = GenerationConfig::default();
        let messages = vec![
            ChatMessage::system("kurallar"),
            ChatMessage::user("soru"),
            ChatMessage::assistant("cevap"),
        ];
        let body = build_request_body(&config, &messages);

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "kurallar");
        assert_eq!(contents[2]["role"], "model");

        assert_eq!(body["generationConfig"]["temperature"], 0.9);
        assert_eq!(body["generationConfig"]["topP"], 0.95);
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 300);

        let safety = body["safetySettings"].as_array().unwrap();
        assert_eq!(safety.len(), 4);
        for setting in safety {
            assert_eq!(setting["threshold"], "BLOCK_NONE");
        }
    }

    #[test]
    fn test_parse_candidate_text() {
        let json = serde_json::json!({
            "candidates": [
                { "content": { "parts": [ { "text": "Merhaba! " }, { "text": "Nasılsın?" } ] } }
            ]
        });
        assert_eq!(
            parse_candidate_text(&json),
            Some("Merhaba! Nasılsın?".to_string())
        );
    }

    #[test]
    fn test_parse_candidate_text_empty_cases() {
        assert_eq!(parse_candidate_text(&serde_json::json!({})), None);
        assert_eq!(
            parse_candidate_text(&serde_json::json!({ "candidates": [] })),
            None
        );
        assert_eq!(
            parse_candidate_text(&serde_json::json!({
                "candidates": [ { "content": { "parts": [] } } ]
            })),
            None
        );
        assert_eq!(
            parse_candidate_text(&serde_json::json!({
                "candidates": [ { "content": { "parts": [ { "text": "   " } ] } } ]
            })),
            None
        );
    }
}
