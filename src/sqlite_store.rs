//! SQLite-backed [`KnowledgeStore`] and [`ConversationStore`].
//!
//! Timestamps are stored as Unix milliseconds. Knowledge item columns are
//! read as nullable and normalized through [`KnowledgeItem::from_stored`].

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use knowbase_core::models::{
    normalize_tags, ChatMessage, Chatbot, ChatbotSettings, Conversation, KnowledgeItem, Role,
};
use knowbase_core::store::{ConversationStore, KnowledgeStore};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn item_from_row(row: &SqliteRow) -> KnowledgeItem {
    let type_label: Option<String> = row.get("type");
    let metadata_json: Option<String> = row.get("metadata_json");
    KnowledgeItem::from_stored(
        row.get("id"),
        row.get("title"),
        row.get("content"),
        type_label.as_deref(),
        row.get("source"),
        metadata_json.as_deref(),
        from_millis(row.get("created_at")),
    )
}

/// Metadata as persisted. Tags live in `metadata.tags`, so tags given as a
/// first-class field are written there.
fn stored_metadata(item: &KnowledgeItem) -> String {
    let mut metadata = item.metadata.clone();
    if normalize_tags(None, &metadata) != item.tags() {
        if !metadata.is_object() {
            metadata = Value::Object(Default::default());
        }
        if let Value::Object(map) = &mut metadata {
            map.insert("tags".to_string(), serde_json::json!(item.tags()));
        }
    }
    metadata.to_string()
}

fn chatbot_from_row(row: &SqliteRow) -> Chatbot {
    let settings_json: String = row.get("settings_json");
    let settings: ChatbotSettings = serde_json::from_str(&settings_json).unwrap_or_default();
    let is_active: i64 = row.get("is_active");
    Chatbot {
        id: row.get("id"),
        name: row.get("name"),
        prompt: row.get("prompt"),
        welcome_message: row.get("welcome_message"),
        fallback_message: row.get("fallback_message"),
        is_active: is_active != 0,
        settings,
    }
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    async fn fetch_knowledge_items(&self, chatbot_id: &str) -> Result<Vec<KnowledgeItem>> {
        let rows = sqlx::query(
            "SELECT id, title, content, type, source, metadata_json, created_at \
             FROM knowledge_items WHERE chatbot_id = ? ORDER BY created_at DESC, id ASC",
        )
        .bind(chatbot_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(item_from_row).collect())
    }

    async fn insert_knowledge_item(&self, chatbot_id: &str, item: &KnowledgeItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO knowledge_items (id, chatbot_id, title, content, type, source, metadata_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                chatbot_id = excluded.chatbot_id,
                title = excluded.title,
                content = excluded.content,
                type = excluded.type,
                source = excluded.source,
                metadata_json = excluded.metadata_json,
                created_at = excluded.created_at
            "#,
        )
        .bind(&item.id)
        .bind(chatbot_id)
        .bind(&item.title)
        .bind(&item.content)
        .bind(item.item_type.as_str())
        .bind(&item.source)
        .bind(stored_metadata(item))
        .bind(item.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_chatbot(&self, chatbot_id: &str) -> Result<Option<Chatbot>> {
        let row = sqlx::query(
            "SELECT id, name, prompt, welcome_message, fallback_message, is_active, settings_json \
             FROM chatbots WHERE id = ?",
        )
        .bind(chatbot_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(chatbot_from_row))
    }

    async fn upsert_chatbot(&self, chatbot: &Chatbot) -> Result<()> {
        let settings_json = serde_json::to_string(&chatbot.settings)?;
        sqlx::query(
            r#"
            INSERT INTO chatbots (id, name, prompt, welcome_message, fallback_message, is_active, settings_json)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                prompt = excluded.prompt,
                welcome_message = excluded.welcome_message,
                fallback_message = excluded.fallback_message,
                is_active = excluded.is_active,
                settings_json = excluded.settings_json
            "#,
        )
        .bind(&chatbot.id)
        .bind(&chatbot.name)
        .bind(&chatbot.prompt)
        .bind(&chatbot.welcome_message)
        .bind(&chatbot.fallback_message)
        .bind(chatbot.is_active as i64)
        .bind(settings_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn find_or_create_conversation(
        &self,
        chatbot_id: &str,
        session_id: &str,
        user_id: Option<&str>,
    ) -> Result<Conversation> {
        let existing = sqlx::query(
            "SELECT id, user_id FROM conversations \
             WHERE chatbot_id = ? AND session_id = ? AND status = 'ACTIVE' \
             ORDER BY created_at ASC LIMIT 1",
        )
        .bind(chatbot_id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            return Ok(Conversation {
                id: row.get("id"),
                chatbot_id: chatbot_id.to_string(),
                session_id: session_id.to_string(),
                user_id: row.get("user_id"),
            });
        }

        let conversation = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            chatbot_id: chatbot_id.to_string(),
            session_id: session_id.to_string(),
            user_id: user_id.map(str::to_string),
        };
        sqlx::query(
            "INSERT INTO conversations (id, chatbot_id, session_id, user_id, status, created_at) \
             VALUES (?, ?, ?, ?, 'ACTIVE', ?)",
        )
        .bind(&conversation.id)
        .bind(&conversation.chatbot_id)
        .bind(&conversation.session_id)
        .bind(&conversation.user_id)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        tracing::debug!(conversation_id = %conversation.id, chatbot_id, "conversation created");
        Ok(conversation)
    }

    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            "SELECT id, role, content, created_at FROM messages \
             WHERE conversation_id = ? ORDER BY seq DESC LIMIT ?",
        )
        .bind(conversation_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut messages: Vec<ChatMessage> = rows
            .iter()
            .map(|row| {
                let role: String = row.get("role");
                ChatMessage {
                    id: row.get("id"),
                    role: Role::from_label(&role),
                    content: row.get("content"),
                    created_at: from_millis(row.get("created_at")),
                }
            })
            .collect();
        messages.reverse();
        Ok(messages)
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
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(conversation_id)
        .bind(role.label())
        .bind(&message.content)
        .bind(message.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_store;
    use chrono::Duration;
    use serde_json::json;
    use tempfile::TempDir;

    /// A fresh database holding a single chatbot, `bot`.
    async fn store() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp.path().join("kb.sqlite")).await.unwrap();
        store.upsert_chatbot(&Chatbot::new("bot", "")).await.unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn test_chatbot_roundtrip_and_update() {
        let (_tmp, store) = store().await;
        let mut bot = Chatbot::new("bot", "Seja gentil.");
        bot.fallback_message = Some("Desculpe.".to_string());
        store.upsert_chatbot(&bot).await.unwrap();

        bot.is_active = false;
        store.upsert_chatbot(&bot).await.unwrap();

        let loaded = store.get_chatbot("bot").await.unwrap().unwrap();
        assert_eq!(loaded, bot);
        assert!(store.get_chatbot("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_items_newest_first_with_tags_from_metadata() {
        let (_tmp, store) = store().await;
        let now = Utc::now();
        let old = KnowledgeItem::new("old", "Antigo", "x")
            .with_tags(["a"])
            .with_created_at(now - Duration::days(1));
        let new = KnowledgeItem::new("new", "Novo", "y").with_created_at(now);
        store.insert_knowledge_item("bot", &old).await.unwrap();
        store.insert_knowledge_item("bot", &new).await.unwrap();

        let items = store.fetch_knowledge_items("bot").await.unwrap();
        assert_eq!(items[0].id, "new");
        assert_eq!(items[1].id, "old");
        assert_eq!(items[1].tags(), ["a".to_string()]);
        assert!(store.fetch_knowledge_items("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rows_with_missing_columns_are_normalized() {
        let (_tmp, store) = store().await;
        sqlx::query(
            "INSERT INTO knowledge_items (id, chatbot_id, title, content, type, source, metadata_json, created_at) \
             VALUES ('raw', 'bot', NULL, NULL, 'WEIRD', NULL, ?, 0)",
        )
        .bind(json!({ "tags": ["ok", 5, ""] }).to_string())
        .execute(store.pool())
        .await
        .unwrap();

        let items = store.fetch_knowledge_items("bot").await.unwrap();
        let item = &items[0];
        assert_eq!(item.title, "");
        assert_eq!(item.content, "");
        assert_eq!(item.source_label(), "unknown");
        assert_eq!(item.tags(), ["ok".to_string()]);
    }

    #[tokio::test]
    async fn test_first_class_tags_survive_storage() {
        let (_tmp, store) = store().await;
        let item: KnowledgeItem = serde_json::from_value(json!({
            "id": "t1",
            "title": "Impressora",
            "tags": ["impressora", "rede"],
            "metadata": { "owner": "ti" }
        }))
        .unwrap();
        store.insert_knowledge_item("bot", &item).await.unwrap();

        let loaded = &store.fetch_knowledge_items("bot").await.unwrap()[0];
        assert_eq!(loaded.tags(), item.tags());
        assert_eq!(loaded.metadata["owner"], "ti");
    }

    #[tokio::test]
    async fn test_messages_bounded_oldest_first() {
        let (_tmp, store) = store().await;
        let conv = store
            .find_or_create_conversation("bot", "s1", None)
            .await
            .unwrap();
        for i in 0..12 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            store
                .append_message(&conv.id, role, &format!("m{}", i))
                .await
                .unwrap();
        }

        let recent = store.recent_messages(&conv.id, 10).await.unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].content, "m2");
        assert_eq!(recent[0].role, Role::User);
        assert_eq!(recent[9].content, "m11");
        assert_eq!(recent[9].role, Role::Assistant);

        let again = store
            .find_or_create_conversation("bot", "s1", None)
            .await
            .unwrap();
        assert_eq!(again.id, conv.id);
    }
}
