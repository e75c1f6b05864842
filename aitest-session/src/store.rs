use aitest_core::ChatMessage;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::error::SessionError;

static GLOBAL: Lazy<SessionStore> = Lazy::new(SessionStore::new);

/// Messages accumulated under one session identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Map from session identifier to its ordered message history.
///
/// Entries are created on first append and never pruned; use
/// [`SessionStore::clear`] between tests.
#[derive(Debug, Default)]
pub struct SessionStore {
    entries: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide store.
    pub fn global() -> &'static SessionStore {
        &GLOBAL
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, SessionEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, SessionEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `messages` to the session, creating it if needed. Returns the
    /// session's new message count.
    pub fn append(&self, session_id: &str, messages: &[ChatMessage]) -> Result<usize, SessionError> {
        if session_id.trim().is_empty() {
            return Err(SessionError::EmptyId);
        }
        let now = Utc::now();
        let mut entries = self.write();
        let entry = entries
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                messages: Vec::new(),
                created_at: now,
                updated_at: now,
            });
        entry.messages.extend_from_slice(messages);
        entry.updated_at = now;
        debug!(
            session_id,
            appended = messages.len(),
            total_messages = entry.messages.len(),
            "session updated"
        );
        Ok(entry.messages.len())
    }

    /// Messages stored for `session_id`; empty for an unknown session.
    pub fn get(&self, session_id: &str) -> Vec<ChatMessage> {
        self.read()
            .get(session_id)
            .map(|entry| entry.messages.clone())
            .unwrap_or_default()
    }

    pub fn entry(&self, session_id: &str) -> Option<SessionEntry> {
        self.read().get(session_id).cloned()
    }

    /// Number of messages stored for `session_id`.
    pub fn len(&self, session_id: &str) -> usize {
        self.read()
            .get(session_id)
            .map_or(0, |entry| entry.messages.len())
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.read().contains_key(session_id)
    }

    pub fn remove(&self, session_id: &str) -> Option<SessionEntry> {
        self.write().remove(session_id)
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Known session identifiers, sorted.
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
