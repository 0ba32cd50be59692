//! Storage abstraction for knowbase.
//!
//! [`KnowledgeStore`] supplies the per-chatbot knowledge snapshot that
//! retrieval ranks; [`ConversationStore`] supplies the bounded message
//! history used by the chat flow. Both are collaborators: retrieval itself
//! never writes.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChatMessage, Chatbot, Conversation, KnowledgeItem, Role};

/// Chatbots and their knowledge items.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`fetch_knowledge_items`](KnowledgeStore::fetch_knowledge_items) | All items of a chatbot, newest first |
/// | [`insert_knowledge_item`](KnowledgeStore::insert_knowledge_item) | Add an item to a chatbot |
/// | [`get_chatbot`](KnowledgeStore::get_chatbot) | Look up a chatbot |
/// | [`upsert_chatbot`](KnowledgeStore::upsert_chatbot) | Insert or update a chatbot |
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Every knowledge item of `chatbot_id`, ordered by creation time
    /// descending, unfiltered by relevance.
    async fn fetch_knowledge_items(&self, chatbot_id: &str) -> Result<Vec<KnowledgeItem>>;

    async fn insert_knowledge_item(&self, chatbot_id: &str, item: &KnowledgeItem) -> Result<()>;

    async fn get_chatbot(&self, chatbot_id: &str) -> Result<Option<Chatbot>>;

    async fn upsert_chatbot(&self, chatbot: &Chatbot) -> Result<()>;
}

/// Conversation sessions and their messages.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The active conversation for `(chatbot_id, session_id)`, created if
    /// none exists.
    async fn find_or_create_conversation(
        &self,
        chatbot_id: &str,
        session_id: &str,
        user_id: Option<&str>,
    ) -> Result<Conversation>;

    /// The `limit` most recent messages, returned oldest first.
    async fn recent_messages(&self, conversation_id: &str, limit: usize)
        -> Result<Vec<ChatMessage>>;

    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<ChatMessage>;
}
