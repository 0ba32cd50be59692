//! One chat turn: retrieve knowledge, build the prompt, generate, persist.
//!
//! Retrieval failures degrade to "no knowledge" and generation failures
//! degrade to the chatbot's fallback message; neither aborts the turn.
//! Only request validation and conversation storage errors are surfaced.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use knowbase_core::context::assemble;
use knowbase_core::models::Role;
use knowbase_core::search::{retrieve, SearchParams};
use knowbase_core::store::{ConversationStore, KnowledgeStore};

use crate::generation::{GenerationClient, GenerationRequest};

/// Reply used when a chatbot has no fallback message of its own.
pub const DEFAULT_FALLBACK: &str = "Desculpe, houve um erro ao processar sua mensagem.";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub message: String,
    pub message_id: String,
    pub conversation_id: String,
    /// Number of knowledge items injected into the prompt.
    pub knowledge_used: usize,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("chatbot not found: {0}")]
    ChatbotNotFound(String),
    #[error("chatbot is not active: {0}")]
    ChatbotInactive(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub struct ChatService {
    knowledge: Arc<dyn KnowledgeStore>,
    conversations: Arc<dyn ConversationStore>,
    generator: Arc<dyn GenerationClient>,
    params: SearchParams,
    history_limit: usize,
}

impl ChatService {
    pub fn new(
        knowledge: Arc<dyn KnowledgeStore>,
        conversations: Arc<dyn ConversationStore>,
        generator: Arc<dyn GenerationClient>,
    ) -> Self {
        Self {
            knowledge,
            conversations,
            generator,
            params: SearchParams::CHAT_CONTEXT,
            history_limit: 10,
        }
    }

    pub fn with_params(mut self, params: SearchParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }

    pub async fn respond(
        &self,
        chatbot_id: &str,
        request: &ChatRequest,
    ) -> Result<ChatReply, ChatError> {
        if request.message.trim().is_empty() || request.session_id.trim().is_empty() {
            return Err(ChatError::InvalidRequest(
                "message and sessionId are required".to_string(),
            ));
        }

        let chatbot = self
            .knowledge
            .get_chatbot(chatbot_id)
            .await?
            .ok_or_else(|| ChatError::ChatbotNotFound(chatbot_id.to_string()))?;
        if !chatbot.is_active {
            return Err(ChatError::ChatbotInactive(chatbot_id.to_string()));
        }

        let conversation = self
            .conversations
            .find_or_create_conversation(
                chatbot_id,
                &request.session_id,
                request.user_id.as_deref(),
            )
            .await?;

        // History is read before the new message is stored.
        let history = self
            .conversations
            .recent_messages(&conversation.id, self.history_limit)
            .await?;
        self.conversations
            .append_message(&conversation.id, Role::User, &request.message)
            .await?;

        let knowledge = match retrieve(
            self.knowledge.as_ref(),
            chatbot_id,
            &request.message,
            &self.params,
        )
        .await
        {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(chatbot_id, error = %e, "knowledge retrieval failed, answering without it");
                Vec::new()
            }
        };

        let generation = GenerationRequest {
            system_prompt: chatbot.prompt.clone(),
            history,
            knowledge: assemble(&knowledge),
            message: request.message.clone(),
            temperature: chatbot.settings.temperature,
            max_tokens: chatbot.settings.max_tokens,
        };

        let text = match self.generator.generate(&generation).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    chatbot_id,
                    provider = self.generator.name(),
                    error = %e,
                    "generation failed, using fallback message"
                );
                chatbot
                    .fallback_message
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_FALLBACK.to_string())
            }
        };

        let reply = self
            .conversations
            .append_message(&conversation.id, Role::Assistant, &text)
            .await?;

        tracing::info!(
            chatbot_id,
            conversation_id = %conversation.id,
            knowledge_used = knowledge.len(),
            "chat turn complete"
        );

        Ok(ChatReply {
            message: reply.content,
            message_id: reply.id,
            conversation_id: conversation.id,
            knowledge_used: knowledge.len(),
        })
    }
}
