//! Bounded per-session conversation history.
//!
//! Each conversation keeps at most `retain` turns, evicting the oldest
//! first. Prompts replay only the trailing window, so a buffer deliberately
//! remembers a little more than the model gets to see. The store itself is
//! bounded too: session ids come from unauthenticated clients, so at most
//! `max_sessions` conversations stay resident and opening one past the cap
//! evicts the least recently used.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::models::Turn;

/// Session key used when a client does not send one.
pub const DEFAULT_SESSION: &str = "default";

/// A FIFO turn buffer with a hard cap.
#[derive(Debug)]
pub struct ConversationBuffer {
    turns: VecDeque<Turn>,
    retain: usize,
}

impl ConversationBuffer {
    pub fn new(retain: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(retain),
            retain,
        }
    }

    /// Appends a turn, evicting from the front once the cap is reached.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.retain {
            self.turns.pop_front();
        }
    }

    /// The trailing `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Turn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

struct SessionEntry {
    buffer: ConversationBuffer,
    last_used: u64,
}

struct StoreInner {
    sessions: HashMap<String, SessionEntry>,
    clock: u64,
}

impl StoreInner {
    /// Returns the buffer for `session`, marking it most recently used.
    /// Opening a new session at the cap evicts the least recently used one.
    fn touch(
        &mut self,
        session: &str,
        retain: usize,
        max_sessions: usize,
    ) -> &mut ConversationBuffer {
        self.clock += 1;
        let stamp = self.clock;

        if !self.sessions.contains_key(session) && self.sessions.len() >= max_sessions {
            let oldest = self
                .sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                self.sessions.remove(&id);
            }
        }

        let entry = self
            .sessions
            .entry(session.to_string())
            .or_insert_with(|| SessionEntry {
                buffer: ConversationBuffer::new(retain),
                last_used: 0,
            });
        entry.last_used = stamp;
        &mut entry.buffer
    }
}

/// All live conversations, keyed by session id.
///
/// Buffers live behind one `std::sync::Mutex`; every method finishes before
/// any await point, so the lock is never held across one.
pub struct SessionStore {
    retain: usize,
    max_sessions: usize,
    inner: Mutex<StoreInner>,
}

impl SessionStore {
    pub fn new(retain: usize, max_sessions: usize) -> Self {
        Self {
            retain,
            max_sessions,
            inner: Mutex::new(StoreInner {
                sessions: HashMap::new(),
                clock: 0,
            }),
        }
    }

    /// Appends `turn` and returns the trailing `window` turns as one step,
    /// so no interleaved append from another request can split the two.
    pub fn append_and_window(&self, session: &str, turn: Turn, window: usize) -> Vec<Turn> {
        let mut inner = self.inner.lock().unwrap();
        let buffer = inner.touch(session, self.retain, self.max_sessions);
        buffer.append(turn);
        buffer.recent(window)
    }

    pub fn append(&self, session: &str, turn: Turn) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .touch(session, self.retain, self.max_sessions)
            .append(turn);
    }

    /// Number of resident conversations.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
