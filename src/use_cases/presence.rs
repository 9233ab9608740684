// Last-writer-wins map from user id to their most recent live session, used
// to target balance notifications at a specific connection.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::use_cases::types::SessionSender;

struct SessionEntry {
    session_id: String,
    sender: SessionSender,
}

/// Tracks which connection currently represents each user.
#[derive(Default)]
pub struct PresenceMap {
    entries: Mutex<HashMap<i64, SessionEntry>>,
}

impl PresenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates a user with a session. A newer session for the same user
    /// replaces the older one.
    pub async fn bind(&self, user_id: i64, session_id: String, sender: SessionSender) {
        let mut entries = self.entries.lock().await;
        entries.insert(user_id, SessionEntry { session_id, sender });
    }

    /// Drops the binding, but only if `session_id` still owns it. A stale
    /// disconnect must not evict a newer connection.
    pub async fn unbind(&self, user_id: i64, session_id: &str) {
        let mut entries = self.entries.lock().await;
        if entries
            .get(&user_id)
            .is_some_and(|e| e.session_id == session_id)
        {
            entries.remove(&user_id);
        }
    }

    /// Returns the sender for the user's most recent session, if connected.
    pub async fn resolve(&self, user_id: i64) -> Option<SessionSender> {
        let entries = self.entries.lock().await;
        entries.get(&user_id).map(|e| e.sender.clone())
    }
}
