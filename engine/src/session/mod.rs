//! Conversation store
//!
//! Holds per-conversation history for the lifetime of the process. Each
//! conversation sits behind its own `tokio::sync::Mutex`; the orchestrator
//! holds that lock for a whole turn, so turns within one conversation are
//! serialized in arrival order while different conversations share nothing.
//! The map lock is only held to look up or insert a conversation.
//!
//! History is bounded by `session.max_turns`. When the bound is exceeded the
//! oldest turns are dropped in user/agent pairs; the latest exchange is
//! always kept. A conversation whose first turn never completes is removed
//! again, so only conversations with history stay in the map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::conductor::Decision;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// One message in a conversation, immutable once appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Set on agent turns: the policy decision that produced the reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            decision: None,
        }
    }

    pub fn agent(decision: Decision) -> Self {
        Self {
            role: Role::Agent,
            content: decision.composed_text().to_string(),
            timestamp: Utc::now(),
            decision: Some(decision),
        }
    }
}

/// A conversation and its history
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    id: String,
    turns: Vec<Turn>,
    #[serde(skip)]
    max_turns: usize,
}

impl Conversation {
    pub fn new(id: impl Into<String>, max_turns: usize) -> Self {
        Self {
            id: id.into(),
            turns: Vec::new(),
            max_turns: max_turns.max(2),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Decision of the most recent agent turn
    pub fn last_decision(&self) -> Option<&Decision> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == Role::Agent)
            .and_then(|turn| turn.decision.as_ref())
    }

    /// Append a completed exchange
    ///
    /// Both turns land together or not at all; a cancelled turn never calls
    /// this.
    pub fn append_exchange(&mut self, user: Turn, agent: Turn) {
        self.turns.push(user);
        self.turns.push(agent);
        self.trim();
    }

    fn trim(&mut self) {
        let mut dropped = 0;
        while self.turns.len() > self.max_turns && self.turns.len() > 2 {
            self.turns.drain(0..2);
            dropped += 2;
        }
        if dropped > 0 {
            tracing::debug!(
                "Trimmed {} turns from conversation {}",
                dropped,
                self.id
            );
        }
    }
}

/// In-memory map of conversations
#[derive(Debug, Clone)]
pub struct ConversationStore {
    conversations: Arc<RwLock<HashMap<String, Arc<Mutex<Conversation>>>>>,
    max_turns: usize,
}

impl ConversationStore {
    pub fn new(max_turns: usize) -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
            max_turns,
        }
    }

    /// Look up a conversation, creating it on first use
    pub async fn get_or_create(&self, id: &str) -> Arc<Mutex<Conversation>> {
        if let Some(existing) = self.conversations.read().await.get(id) {
            return Arc::clone(existing);
        }

        let mut conversations = self.conversations.write().await;
        Arc::clone(conversations.entry(id.to_string()).or_insert_with(|| {
            tracing::debug!("Created conversation {}", id);
            Arc::new(Mutex::new(Conversation::new(id, self.max_turns)))
        }))
    }

    /// Drop a conversation that never recorded a turn
    ///
    /// Used after a cancelled or failed first turn so the attempt leaves no
    /// entry behind. A conversation that another caller still holds is kept.
    pub async fn discard_if_empty(&self, id: &str) -> bool {
        let mut conversations = self.conversations.write().await;
        let Some(existing) = conversations.get(id) else {
            return false;
        };

        // Handles are only cloned under the map lock
        if Arc::strong_count(existing) > 1 {
            return false;
        }
        let empty = match existing.try_lock() {
            Ok(conversation) => conversation.is_empty(),
            Err(_) => false,
        };

        if empty {
            conversations.remove(id);
            tracing::debug!("Discarded empty conversation {}", id);
        }
        empty
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Mutex<Conversation>>> {
        self.conversations.read().await.get(id).cloned()
    }

    /// Copy of a conversation's current state
    ///
    /// Waits for any in-flight turn on that conversation to finish.
    pub async fn snapshot(&self, id: &str) -> Option<Conversation> {
        let conversation = self.get(id).await?;
        let guard = conversation.lock().await;
        Some(guard.clone())
    }

    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Intent;

    fn decision(text: &str) -> Decision {
        Decision::out_of_scope(text)
    }

    #[test]
    fn test_append_exchange_keeps_order() {
        let mut conversation = Conversation::new("c-1", 10);
        conversation.append_exchange(Turn::user("hello"), Turn::agent(decision("hi")));

        assert_eq!(conversation.turns().len(), 2);
        assert_eq!(conversation.turns()[0].role, Role::User);
        assert_eq!(conversation.turns()[1].role, Role::Agent);
        assert_eq!(conversation.turns()[1].content, "hi");
        assert_eq!(
            conversation.last_decision().map(|d| d.intent()),
            Some(Intent::OutOfScope)
        );
    }

    #[test]
    fn test_trim_drops_oldest_pairs() {
        let mut conversation = Conversation::new("c-1", 4);
        for i in 0..3 {
            conversation.append_exchange(
                Turn::user(format!("q{}", i)),
                Turn::agent(decision(&format!("a{}", i))),
            );
        }

        assert_eq!(conversation.turns().len(), 4);
        assert_eq!(conversation.turns()[0].content, "q1");
        assert_eq!(conversation.turns()[3].content, "a2");
    }

    #[tokio::test]
    async fn test_store_returns_same_conversation() {
        let store = ConversationStore::new(10);
        let a = store.get_or_create("c-1").await;
        let b = store.get_or_create("c-1").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len().await, 1);
        assert!(store.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_discard_if_empty() {
        let store = ConversationStore::new(10);

        store.get_or_create("fresh").await;
        assert!(store.discard_if_empty("fresh").await);
        assert!(store.get("fresh").await.is_none());

        let used = store.get_or_create("used").await;
        used.lock()
            .await
            .append_exchange(Turn::user("hello"), Turn::agent(decision("hi")));
        drop(used);
        assert!(!store.discard_if_empty("used").await);
        assert!(store.get("used").await.is_some());

        // Still held by a waiting turn
        let held = store.get_or_create("held").await;
        assert!(!store.discard_if_empty("held").await);
        drop(held);

        assert!(!store.discard_if_empty("missing").await);
        assert_eq!(store.len().await, 2);
    }
}
