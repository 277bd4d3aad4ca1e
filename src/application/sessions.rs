use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::memory::ConversationMemory;

pub type SharedMemory = Arc<tokio::sync::Mutex<ConversationMemory>>;

struct SessionEntry {
    memory: SharedMemory,
    last_used: Instant,
}

/// Conversation memories keyed by session id.
///
/// Each session's memory sits behind its own async mutex, so turns of one
/// session are serialized while different sessions proceed concurrently.
/// Sessions idle for longer than the TTL are dropped on the next lookup.
/// At most `max_sessions` are kept: a new session pushes out the least
/// recently used one that no request is holding.
pub struct SessionStore {
    token_limit: usize,
    ttl: Duration,
    max_sessions: usize,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionStore {
    pub fn new(token_limit: usize, ttl: Duration, max_sessions: usize) -> Self {
        Self {
            token_limit,
            ttl,
            max_sessions,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the memory for `session_id`, creating an empty one if needed.
    pub fn session(&self, session_id: &str) -> SharedMemory {
        let mut sessions = self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();

        let before = sessions.len();
        sessions.retain(|id, entry| {
            id == session_id
                || Arc::strong_count(&entry.memory) > 1
                || now.duration_since(entry.last_used) < self.ttl
        });
        if sessions.len() < before {
            log::debug!("Evicted {} idle sessions", before - sessions.len());
        }

        if !sessions.contains_key(session_id) && sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .filter(|(_, entry)| Arc::strong_count(&entry.memory) == 1)
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    log::debug!("Session limit reached, dropping {:?}", id);
                    sessions.remove(&id);
                }
                // Every session is mid-request
                None => log::warn!("Session limit of {} exceeded by busy sessions", self.max_sessions),
            }
        }

        let entry = sessions.entry(session_id.to_string()).or_insert_with(|| {
            log::debug!("Starting conversation session {:?}", session_id);
            SessionEntry {
                memory: Arc::new(tokio::sync::Mutex::new(ConversationMemory::new(self.token_limit))),
                last_used: now,
            }
        });
        entry.last_used = now;
        entry.memory.clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
