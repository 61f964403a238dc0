//! Conversation-scoped message history.
//!
//! Each conversation identifier owns an ordered, append-only message list
//! capped at [`MAX_HISTORY`] entries; the oldest entries are evicted on
//! overflow. State lives in process memory, so it does not survive a
//! restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Maximum retained messages per conversation.
pub const MAX_HISTORY: usize = 50;

/// A single stored conversation message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub role: ConversationRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Author of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationRole {
    User,
    Ai,
}

impl ConversationMessage {
    /// Create a user message stamped with the current time
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: ConversationRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create an assistant message stamped with the current time
    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: ConversationRole::Ai,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Storage interface for conversation history
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append a message, evicting the oldest entries beyond [`MAX_HISTORY`]
    async fn append(&self, conversation_id: &str, message: ConversationMessage);

    /// The most recent `limit` messages in chronological order, plus the
    /// total number currently retained
    async fn history(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> (Vec<ConversationMessage>, usize);

    /// Drop a conversation. Clearing an unknown conversation is a no-op.
    async fn clear(&self, conversation_id: &str);
}

/// In-memory conversation store
#[derive(Default)]
pub struct MemoryStore {
    conversations: Mutex<HashMap<String, Vec<ConversationMessage>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn append(&self, conversation_id: &str, message: ConversationMessage) {
        let mut conversations = self.conversations.lock().await;
        let messages = conversations.entry(conversation_id.to_string()).or_default();
        messages.push(message);
        if messages.len() > MAX_HISTORY {
            let excess = messages.len() - MAX_HISTORY;
            messages.drain(..excess);
        }
    }

    async fn history(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> (Vec<ConversationMessage>, usize) {
        let conversations = self.conversations.lock().await;
        match conversations.get(conversation_id) {
            Some(messages) => {
                let total = messages.len();
                let start = total.saturating_sub(limit);
                (messages[start..].to_vec(), total)
            }
            None => (Vec::new(), 0),
        }
    }

    async fn clear(&self, conversation_id: &str) {
        self.conversations.lock().await.remove(conversation_id);
    }
}
