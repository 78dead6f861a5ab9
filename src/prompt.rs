//! Prompt assembly.
//!
//! Every prompt starts with the persona as a system message; when retrieval
//! produced context, the knowledge block is folded into that same message.
//! The replayed history turns follow in order, the current user message
//! last.

use crate::models::{ChatMessage, RetrievalResult, Turn};
use crate::retrieval::truncate_chars;

/// Ayla's standing instructions.
pub const PERSONA: &str = r#"Sen Ayla, samimi ve zeki bir AI asistanısın.

ÖZELLİKLERİN:
- Modern yapay zeka asistanları gibi doğal, akıcı konuşursun
- Kısa ve öz cevaplar verirsin (2-4 cümle)
- Emoji kullanabilirsin ama abartma
- "Ben bir AI'yım ama..." gibi klişe cümleler kurma
- Psikoloji konusunda uzman bilgin var

KURALLAR:
1. Her konuda rahat sohbet et (hava, spor, yemek, teknoloji...)
2. Psikoloji/BDT soruları için bilgi bankamı kullan
3. Kriz durumlarında (intihar, zarar verme) 112/155'i öner
4. Direkt cevap ver, fazla açıklama yapma"#;

/// Heading that introduces retrieved context inside the system message.
const KNOWLEDGE_HEADING: &str = "\n\nBİLGİ BANKASI:\n";

/// Assembles the message list for one generation call.
///
/// `history` is the already-windowed turn sequence and includes the current
/// user message as its last entry. Retrieved context is clipped to
/// `context_chars` characters.
pub fn compose(
    persona: &str,
    retrieval: &RetrievalResult,
    history: &[Turn],
    context_chars: usize,
) -> Vec<ChatMessage> {
    let mut system = persona.to_string();
    if !retrieval.context.is_empty() {
        system.push_str(KNOWLEDGE_HEADING);
        system.push_str(truncate_chars(&retrieval.context, context_chars));
    }

    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::system(system));
    for turn in history {
        messages.push(ChatMessage {
            role: turn.role,
            content: turn.content.clone(),
        });
    }
    messages
}
