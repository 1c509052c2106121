//! Short in-memory session window.
//!
//! Keeps the last few turns per session so escalated queries can carry a
//! small context snapshot to the LLM. This is deliberately not dialog
//! state: entries age out with their session and the snapshot is capped
//! to a character budget before prompt assembly.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::util::LruCache;

/// Turns kept per session.
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

/// Sessions tracked before the oldest is dropped.
pub const DEFAULT_SESSION_CAPACITY: usize = 1_024;

/// Character budget for a snapshot handed to the prompt builder.
pub const DEFAULT_SNAPSHOT_BUDGET: usize = 2_000;

/// The context attached to an escalation payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// Session identifier, when the caller supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// User identifier, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Most recent utterances, oldest first.
    #[serde(default)]
    pub recent_turns: Vec<String>,
}

impl ContextSnapshot {
    /// Trim the snapshot to a character budget, dropping the oldest turns
    /// first.
    pub fn truncated(mut self, budget_chars: usize) -> Self {
        let mut total: usize = self.recent_turns.iter().map(|t| t.chars().count()).sum();
        while total > budget_chars && !self.recent_turns.is_empty() {
            let dropped = self.recent_turns.remove(0);
            total -= dropped.chars().count();
        }
        self
    }
}

/// Bounded per-session history.
pub struct SessionWindow {
    sessions: Mutex<LruCache<String, VecDeque<String>>>,
    history_limit: usize,
}

impl Default for SessionWindow {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_CAPACITY, DEFAULT_HISTORY_LIMIT)
    }
}

impl SessionWindow {
    /// Create a window tracking up to `session_capacity` sessions with
    /// `history_limit` turns each.
    pub fn new(session_capacity: usize, history_limit: usize) -> Self {
        Self {
            sessions: Mutex::new(LruCache::new(session_capacity)),
            history_limit: history_limit.max(1),
        }
    }

    /// Append a turn to a session.
    pub fn record(&self, session_id: &str, utterance: &str) {
        let mut sessions = self.sessions.lock();
        let key = session_id.to_string();
        if let Some(history) = sessions.get(&key) {
            let mut history = history.clone();
            if history.len() >= self.history_limit {
                history.pop_front();
            }
            history.push_back(utterance.to_string());
            sessions.insert(key, history);
        } else {
            let mut history = VecDeque::new();
            history.push_back(utterance.to_string());
            sessions.insert(key, history);
        }
    }

    /// Build a snapshot for a session (empty history when unknown).
    pub fn snapshot(&self, session_id: Option<&str>, user_id: Option<&str>) -> ContextSnapshot {
        let recent_turns = session_id
            .and_then(|id| {
                self.sessions
                    .lock()
                    .get(&id.to_string())
                    .map(|history| history.iter().cloned().collect())
            })
            .unwrap_or_default();
        ContextSnapshot {
            session_id: session_id.map(str::to_string),
            user_id: user_id.map(str::to_string),
            recent_turns,
        }
        .truncated(DEFAULT_SNAPSHOT_BUDGET)
    }
}
