//! The chat pipeline.
//!
//! [`ChatService`] owns everything one reply needs: the per-session history
//! store, the optional knowledge index, and the generation client. Every
//! outcome maps to exactly one user-visible string; upstream error detail
//! stays in the logs.

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::genai::{self, Delay, GenerationApi, GenerationOutcome};
use crate::history::SessionStore;
use crate::index::PassageIndex;
use crate::models::Turn;
use crate::prompt;
use crate::retrieval::{self, truncate_chars};

/// Nudge returned for an empty or whitespace-only message.
pub const EMPTY_INPUT_REPLY: &str = "Bir şeyler yaz bakalım 😊";

/// Served while the generation client is missing (no API key at startup).
pub const OFFLINE_REPLY: &str = "Üzgünüm, şu anda bağlantım yok 😔";

/// The model answered but every candidate came back empty.
pub const EMPTY_CANDIDATE_REPLY: &str = "Hmm, şu an yanıt veremedim. Tekrar dener misin? 🤔";

/// Upstream trouble, transient or permanent; the user sees one string.
pub const UPSTREAM_TROUBLE_REPLY: &str = "Bağlantı sorunu yaşıyorum, biraz sonra tekrar dene 😊";

/// Catch-all for requests the endpoint could not read.
pub const REQUEST_TROUBLE_REPLY: &str = "Bir sorun oluştu, tekrar dener misin? 😊";

/// One chat deployment: history, retrieval, and generation behind a single
/// `respond` call.
pub struct ChatService {
    config: Config,
    api: Option<Arc<dyn GenerationApi>>,
    delay: Arc<dyn Delay>,
    index: Option<Arc<dyn PassageIndex>>,
    sessions: SessionStore,
}

impl ChatService {
    pub fn new(
        config: Config,
        api: Option<Arc<dyn GenerationApi>>,
        delay: Arc<dyn Delay>,
        index: Option<Arc<dyn PassageIndex>>,
    ) -> Self {
        let sessions =
            SessionStore::new(config.history.retained_turns, config.history.max_sessions);
        Self {
            config,
            api,
            delay,
            index,
            sessions,
        }
    }

    /// Whether a knowledge index was loaded at startup. Constant afterwards.
    pub fn rag_enabled(&self) -> bool {
        self.index.is_some()
    }

    pub fn model(&self) -> &str {
        &self.config.generation.model
    }

    /// Produces the reply for one user message.
    ///
    /// Always returns a string fit for the end user; every failure inside
    /// the pipeline collapses to one of the fixed replies above. Only a
    /// successful exchange enters the session history.
    pub async fn respond(&self, session: &str, message: &str) -> String {
        let message = message.trim();
        if message.is_empty() {
            return EMPTY_INPUT_REPLY.to_string();
        }

        info!(session, message, "user message");

        let Some(api) = &self.api else {
            return OFFLINE_REPLY.to_string();
        };

        let history = self.sessions.append_and_window(
            session,
            Turn::user(message),
            self.config.history.replayed_turns,
        );

        let retrieval =
            retrieval::maybe_retrieve(self.index.as_deref(), &self.config.knowledge, message)
                .await;

        let messages = prompt::compose(
            prompt::PERSONA,
            &retrieval,
            &history,
            self.config.knowledge.context_chars,
        );

        let outcome =
            genai::generate(api.as_ref(), self.delay.as_ref(), &self.config.generation, &messages)
                .await;

        let reply = match outcome {
            GenerationOutcome::Answered(answer) => {
                // The bare answer goes into history; citations only decorate
                // the outgoing reply.
                self.sessions.append(session, Turn::assistant(answer.clone()));
                if retrieval.sources.is_empty() {
                    answer
                } else {
                    format!("{}\n\n{}", answer, retrieval.sources.join("\n"))
                }
            }
            GenerationOutcome::Empty => EMPTY_CANDIDATE_REPLY.to_string(),
            GenerationOutcome::Unavailable(_) | GenerationOutcome::Failed(_) => {
                UPSTREAM_TROUBLE_REPLY.to_string()
            }
        };

        info!(session, reply = truncate_chars(&reply, 80), "reply");
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genai::GenaiError;
    use crate::models::{ChatMessage, Role, ScoredPassage};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replies from a script and records every prompt it was sent.
    struct CapturingApi {
        replies: Mutex<VecDeque<Result<Option<String>, GenaiError>>>,
        prompts: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl CapturingApi {
        fn new(replies: Vec<Result<Option<String>, GenaiError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<Vec<ChatMessage>> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerationApi for CapturingApi {
        async fn request(&self, messages: &[ChatMessage]) -> Result<Option<String>, GenaiError> {
            self.prompts.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("capturing api ran out of replies")
        }
    }

    struct NoDelay;

    #[async_trait]
    impl Delay for NoDelay {
        async fn sleep(&self, _duration: Duration) {}
    }

    struct OneHitIndex;

    #[async_trait]
    impl PassageIndex for OneHitIndex {
        async fn top_passages(&self, _query: &str, _k: usize) -> Result<Vec<ScoredPassage>> {
            Ok(vec![ScoredPassage {
                text: "Nefes egzersizleri kaygıyı azaltır.".to_string(),
                file_name: "mindfulness_egzersizleri.pdf".to_string(),
                score: 0.9,
            }])
        }

        fn len(&self) -> usize {
            1
        }
    }

    fn service(
        api: Option<Arc<dyn GenerationApi>>,
        index: Option<Arc<dyn PassageIndex>>,
    ) -> ChatService {
        ChatService::new(Config::default(), api, Arc::new(NoDelay), index)
    }

    #[tokio::test]
    async fn test_empty_input_gets_nudge_without_generation() {
        let api = CapturingApi::new(vec![]);
        let svc = service(Some(api.clone()), None);
        assert_eq!(svc.respond("s", "   ").await, EMPTY_INPUT_REPLY);
        assert!(api.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_offline_reply_without_client() {
        let svc = service(None, None);
        assert_eq!(svc.respond("s", "merhaba").await, OFFLINE_REPLY);
    }

    #[tokio::test]
    async fn test_successful_exchange_enters_history() {
        let api = CapturingApi::new(vec![
            Ok(Some("Selam!".to_string())),
            Ok(Some("İyiyim, sen?".to_string())),
        ]);
        let svc = service(Some(api.clone()), None);

        svc.respond("s", "merhaba").await;
        svc.respond("s", "nasılsın").await;

        let prompts = api.prompts();
        let second = &prompts[1];
        // persona + (user, assistant, user)
        assert_eq!(second.len(), 4);
        assert_eq!(second[0].role, Role::System);
        assert_eq!(second[1].content, "merhaba");
        assert_eq!(second[2].role, Role::Assistant);
        assert_eq!(second[2].content, "Selam!");
        assert_eq!(second[3].content, "nasılsın");
    }

    #[tokio::test]
    async fn test_citations_decorate_reply_but_not_history() {
        let api = CapturingApi::new(vec![
            Ok(Some("Nefes egzersizi iyi gelir.".to_string())),
            Ok(Some("Tabii.".to_string())),
        ]);
        let svc = service(Some(api.clone()), Some(Arc::new(OneHitIndex)));

        let reply = svc.respond("s", "nefes egzersizi nasıl yapılır").await;
        assert!(reply.ends_with("📚 mindfulness_egzersizleri.pdf"));
        assert!(reply.starts_with("Nefes egzersizi iyi gelir."));

        svc.respond("s", "devam").await;
        let prompts = api.prompts();
        let second = &prompts[1];
        let assistant_turn = second.iter().find(|m| m.role == Role::Assistant).unwrap();
        assert_eq!(assistant_turn.content, "Nefes egzersizi iyi gelir.");
        assert!(!assistant_turn.content.contains("📚"));
    }

    #[tokio::test]
    async fn test_non_domain_reply_carries_no_citation() {
        let api = CapturingApi::new(vec![Ok(Some("Güneşli!".to_string()))]);
        let svc = service(Some(api), Some(Arc::new(OneHitIndex)));
        let reply = svc.respond("s", "bugün hava nasıl").await;
        assert!(!reply.contains("📚"));
    }

    #[tokio::test]
    async fn test_empty_candidate_reply() {
        let api = CapturingApi::new(vec![Ok(None)]);
        let svc = service(Some(api), None);
        assert_eq!(svc.respond("s", "merhaba").await, EMPTY_CANDIDATE_REPLY);
    }

    #[tokio::test]
    async fn test_permanent_failure_reply() {
        let api = CapturingApi::new(vec![Err(GenaiError::Http {
            status: 401,
            detail: "bad key".to_string(),
        })]);
        let svc = service(Some(api), None);
        assert_eq!(svc.respond("s", "merhaba").await, UPSTREAM_TROUBLE_REPLY);
    }

    #[tokio::test]
    async fn test_failed_reply_stays_out_of_history() {
        let api = CapturingApi::new(vec![
            Err(GenaiError::Http {
                status: 400,
                detail: "bad request".to_string(),
            }),
            Ok(Some("Selam!".to_string())),
        ]);
        let svc = service(Some(api.clone()), None);

        svc.respond("s", "ilk mesaj").await;
        svc.respond("s", "ikinci mesaj").await;

        let prompts = api.prompts();
        let second = &prompts[1];
        // persona + both user turns; no assistant turn recorded in between
        assert_eq!(second.len(), 3);
        assert!(second.iter().all(|m| m.role != Role::Assistant));
        assert!(second
            .iter()
            .all(|m| !m.content.contains(UPSTREAM_TROUBLE_REPLY)));
    }

    #[tokio::test]
    async fn test_sessions_do_not_share_history() {
        let api = CapturingApi::new(vec![
            Ok(Some("a-cevap".to_string())),
            Ok(Some("b-cevap".to_string())),
        ]);
        let svc = service(Some(api.clone()), None);

        svc.respond("oturum-a", "a'nın sırrı").await;
        svc.respond("oturum-b", "selam").await;

        let prompts = api.prompts();
        let b_prompt = &prompts[1];
        assert!(b_prompt.iter().all(|m| !m.content.contains("a'nın sırrı")));
    }
}
