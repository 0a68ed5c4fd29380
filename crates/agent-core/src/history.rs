//! Chat History Storage
//!
//! Durable record of conversations as users see them: one entry per user
//! message and one per final assistant answer. Tool traffic never lands here.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::message::Role;

const TITLE_CHARS: usize = 50;

/// A stored conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredConversation {
    pub id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl StoredConversation {
    fn new(id: &str, title: Option<String>, metadata: Option<Value>) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_owned(),
            title,
            created_at: now,
            updated_at: now,
            metadata,
        }
    }
}

/// A stored message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Title derived from the first user message
pub fn title_from(first_message: &str) -> String {
    let mut title: String = first_message.chars().take(TITLE_CHARS).collect();
    title = title.trim().to_owned();
    if first_message.chars().count() > TITLE_CHARS {
        title.push_str("...");
    }
    title
}

/// Conversation/message persistence
#[async_trait]
pub trait ChatStorage: Send + Sync {
    /// Create a conversation, or refresh `updated_at` if it exists
    async fn create_conversation(
        &self,
        id: &str,
        title: Option<String>,
        metadata: Option<Value>,
    ) -> Result<StoredConversation>;

    async fn get_conversation(&self, id: &str) -> Result<Option<StoredConversation>>;

    /// Most recently updated first
    async fn list_conversations(&self, limit: usize, offset: usize) -> Result<Vec<StoredConversation>>;

    async fn update_conversation(
        &self,
        id: &str,
        title: Option<String>,
        metadata: Option<Value>,
    ) -> Result<Option<StoredConversation>>;

    /// Delete a conversation and its messages
    async fn delete_conversation(&self, id: &str) -> Result<bool>;

    /// Append a message, creating the conversation if needed
    async fn add_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<StoredMessage>;

    /// Oldest first, optionally capped
    async fn get_messages(&self, conversation_id: &str, limit: Option<usize>) -> Result<Vec<StoredMessage>>;

    /// Returns the number of messages removed
    async fn delete_messages(&self, conversation_id: &str) -> Result<usize>;

    /// Set the conversation title from its first message
    async fn generate_title(&self, conversation_id: &str, first_message: &str) -> Result<String> {
        let title = title_from(first_message);
        self.update_conversation(conversation_id, Some(title.clone()), None)
            .await?;
        Ok(title)
    }
}

#[derive(Default)]
struct Entry {
    conversation: Option<StoredConversation>,
    messages: Vec<StoredMessage>,
}

/// In-memory chat storage (for development/testing)
#[derive(Default)]
pub struct MemoryChatStorage {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryChatStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStorage for MemoryChatStorage {
    async fn create_conversation(
        &self,
        id: &str,
        title: Option<String>,
        metadata: Option<Value>,
    ) -> Result<StoredConversation> {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(id.to_owned()).or_default();

        let conversation = match entry.conversation.take() {
            Some(mut existing) => {
                existing.updated_at = Utc::now();
                existing
            }
            None => StoredConversation::new(id, title, metadata),
        };
        entry.conversation = Some(conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<StoredConversation>> {
        let entries = self.entries.read().await;
        Ok(entries.get(id).and_then(|e| e.conversation.clone()))
    }

    async fn list_conversations(&self, limit: usize, offset: usize) -> Result<Vec<StoredConversation>> {
        let entries = self.entries.read().await;
        let mut result: Vec<_> = entries
            .values()
            .filter_map(|e| e.conversation.clone())
            .collect();

        // Sort by updated_at descending
        result.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(result.into_iter().skip(offset).take(limit).collect())
    }

    async fn update_conversation(
        &self,
        id: &str,
        title: Option<String>,
        metadata: Option<Value>,
    ) -> Result<Option<StoredConversation>> {
        let mut entries = self.entries.write().await;
        let Some(conversation) = entries.get_mut(id).and_then(|e| e.conversation.as_mut()) else {
            return Ok(None);
        };

        if title.is_some() {
            conversation.title = title;
        }
        if metadata.is_some() {
            conversation.metadata = metadata;
        }
        conversation.updated_at = Utc::now();
        Ok(Some(conversation.clone()))
    }

    async fn delete_conversation(&self, id: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(id).is_some_and(|e| e.conversation.is_some()))
    }

    async fn add_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<StoredMessage> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let entry = entries.entry(conversation_id.to_owned()).or_default();

        match entry.conversation.as_mut() {
            Some(conversation) => conversation.updated_at = now,
            None => entry.conversation = Some(StoredConversation::new(conversation_id, None, None)),
        }

        let message = StoredMessage {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_owned(),
            role,
            content: content.to_owned(),
            created_at: now,
            metadata,
        };
        entry.messages.push(message.clone());
        Ok(message)
    }

    async fn get_messages(&self, conversation_id: &str, limit: Option<usize>) -> Result<Vec<StoredMessage>> {
        let entries = self.entries.read().await;
        let messages = entries
            .get(conversation_id)
            .map(|e| e.messages.as_slice())
            .unwrap_or_default();

        Ok(messages
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn delete_messages(&self, conversation_id: &str) -> Result<usize> {
        let mut entries = self.entries.write().await;
        Ok(entries
            .get_mut(conversation_id)
            .map(|e| std::mem::take(&mut e.messages).len())
            .unwrap_or_default())
    }
}
