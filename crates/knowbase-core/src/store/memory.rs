//! In-memory [`KnowledgeStore`] and [`ConversationStore`] for tests and
//! embedding.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{ChatMessage, Chatbot, Conversation, KnowledgeItem, Role};

use super::{ConversationStore, KnowledgeStore};

struct StoredItem {
    chatbot_id: String,
    item: KnowledgeItem,
}

struct StoredMessage {
    conversation_id: String,
    message: ChatMessage,
}

/// In-memory store holding chatbots, knowledge items, and conversations.
pub struct InMemoryStore {
    chatbots: RwLock<HashMap<String, Chatbot>>,
    items: RwLock<Vec<StoredItem>>,
    conversations: RwLock<Vec<Conversation>>,
    messages: RwLock<Vec<StoredMessage>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            chatbots: RwLock::new(HashMap::new()),
            items: RwLock::new(Vec::new()),
            conversations: RwLock::new(Vec::new()),
            messages: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl KnowledgeStore for InMemoryStore {
    async fn fetch_knowledge_items(&self, chatbot_id: &str) -> Result<Vec<KnowledgeItem>> {
        let items = self.items.read().map_err(poisoned)?;
        let mut found: Vec<KnowledgeItem> = items
            .iter()
            .filter(|s| s.chatbot_id == chatbot_id)
            .map(|s| s.item.clone())
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn insert_knowledge_item(&self, chatbot_id: &str, item: &KnowledgeItem) -> Result<()> {
        let mut items = self.items.write().map_err(poisoned)?;
        items.retain(|s| s.item.id != item.id);
        items.push(StoredItem {
            chatbot_id: chatbot_id.to_string(),
            item: item.clone(),
        });
        Ok(())
    }

    async fn get_chatbot(&self, chatbot_id: &str) -> Result<Option<Chatbot>> {
        let chatbots = self.chatbots.read().map_err(poisoned)?;
        Ok(chatbots.get(chatbot_id).cloned())
    }

    async fn upsert_chatbot(&self, chatbot: &Chatbot) -> Result<()> {
        let mut chatbots = self.chatbots.write().map_err(poisoned)?;
        chatbots.insert(chatbot.id.clone(), chatbot.clone());
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn find_or_create_conversation(
        &self,
        chatbot_id: &str,
        session_id: &str,
        user_id: Option<&str>,
    ) -> Result<Conversation> {
        let mut conversations = self.conversations.write().map_err(poisoned)?;
        if let Some(existing) = conversations
            .iter()
            .find(|c| c.chatbot_id == chatbot_id && c.session_id == session_id)
        {
            return Ok(existing.clone());
        }
        let conversation = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            chatbot_id: chatbot_id.to_string(),
            session_id: session_id.to_string(),
            user_id: user_id.map(str::to_string),
        };
        conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        let messages = self.messages.read().map_err(poisoned)?;
        let all: Vec<&StoredMessage> = messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .collect();
        let skip = all.len().saturating_sub(limit);
        Ok(all[skip..].iter().map(|m| m.message.clone()).collect())
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<ChatMessage> {
        let message = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let mut messages = self.messages.write().map_err(poisoned)?;
        messages.push(StoredMessage {
            conversation_id: conversation_id.to_string(),
            message: message.clone(),
        });
        Ok(message)
    }
}
