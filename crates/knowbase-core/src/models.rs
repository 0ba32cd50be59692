//! Core data models: knowledge items, search results, chatbots, and
//! conversation messages.
//!
//! Knowledge items arrive from storage in whatever shape was persisted.
//! [`KnowledgeItem`] normalizes them once at that boundary (missing text
//! becomes empty, unknown types become [`ItemType::Text`], tags are read from
//! either the first-class `tags` field or `metadata.tags`), so scoring and
//! projection never special-case malformed rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::scoring::ScoreBreakdown;

/// Source label used when a knowledge item carries no provenance.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Kind of knowledge item. Affects scoring through a small fixed bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemType {
    #[default]
    Text,
    Faq,
    Document,
    Url,
    Api,
}

impl ItemType {
    /// Storage label (`"TEXT"`, `"FAQ"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Text => "TEXT",
            ItemType::Faq => "FAQ",
            ItemType::Document => "DOCUMENT",
            ItemType::Url => "URL",
            ItemType::Api => "API",
        }
    }

    /// Parse a stored label, case-insensitively. Unknown labels map to `Text`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "FAQ" => ItemType::Faq,
            "DOCUMENT" => ItemType::Document,
            "URL" => ItemType::Url,
            "API" => ItemType::Api,
            _ => ItemType::Text,
        }
    }
}

impl<'de> Deserialize<'de> for ItemType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(raw.as_str().map(ItemType::from_label).unwrap_or_default())
    }
}

/// Read the canonical tag list for an item.
///
/// The first-class `tags` value wins when it is present and not null;
/// otherwise `metadata.tags` is used. Anything that is not an array yields
/// an empty list, and non-string or blank entries are dropped.
pub fn normalize_tags(first_class: Option<&Value>, metadata: &Value) -> Vec<String> {
    let source = match first_class {
        Some(v) if !v.is_null() => Some(v),
        _ => metadata.get("tags"),
    };

    match source {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .filter(|tag| !tag.trim().is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// A unit of retrievable chatbot knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "KnowledgeItemRecord", rename_all = "camelCase")]
pub struct KnowledgeItem {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub source: Option<String>,
    tags: Vec<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Wire/storage shape of a knowledge item before normalization.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct KnowledgeItemRecord {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, rename = "type")]
    item_type: ItemType,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    tags: Option<Value>,
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
}

impl From<KnowledgeItemRecord> for KnowledgeItem {
    fn from(record: KnowledgeItemRecord) -> Self {
        let metadata = record.metadata.unwrap_or_else(|| Value::Object(Default::default()));
        let tags = normalize_tags(record.tags.as_ref(), &metadata);
        Self {
            id: record.id,
            title: record.title.unwrap_or_default(),
            content: record.content.unwrap_or_default(),
            item_type: record.item_type,
            source: record.source,
            tags,
            metadata,
            created_at: record.created_at,
        }
    }
}

impl KnowledgeItem {
    /// Create a `TEXT` item with no tags, source, or metadata.
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            item_type: ItemType::Text,
            source: None,
            tags: Vec::new(),
            metadata: Value::Object(Default::default()),
            created_at: Utc::now(),
        }
    }

    /// Rebuild an item from persisted columns.
    ///
    /// `metadata_json` that fails to parse is treated as an empty object.
    pub fn from_stored(
        id: String,
        title: Option<String>,
        content: Option<String>,
        type_label: Option<&str>,
        source: Option<String>,
        metadata_json: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let metadata = metadata_json
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
            .filter(Value::is_object)
            .unwrap_or_else(|| Value::Object(Default::default()));
        let tags = normalize_tags(None, &metadata);
        Self {
            id,
            title: title.unwrap_or_default(),
            content: content.unwrap_or_default(),
            item_type: type_label.map(ItemType::from_label).unwrap_or_default(),
            source,
            tags,
            metadata,
            created_at,
        }
    }

    pub fn with_type(mut self, item_type: ItemType) -> Self {
        self.item_type = item_type;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Replace the tags. They are mirrored into `metadata.tags`, which is
    /// where storage keeps them.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: Vec<Value> = tags.into_iter().map(|t| Value::String(t.into())).collect();
        if !self.metadata.is_object() {
            self.metadata = Value::Object(Default::default());
        }
        if let Value::Object(map) = &mut self.metadata {
            map.insert("tags".to_string(), Value::Array(tags));
        }
        self.tags = normalize_tags(None, &self.metadata);
        self
    }

    /// Replace the metadata and re-derive tags from `metadata.tags`.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.tags = normalize_tags(None, &metadata);
        self.metadata = metadata;
        self
    }

    /// Canonical, normalized tag list.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Provenance label, `"unknown"` when absent.
    pub fn source_label(&self) -> &str {
        self.source.as_deref().unwrap_or(UNKNOWN_SOURCE)
    }
}

/// A knowledge item projected with its relevance score for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "type", default)]
    pub item_type: ItemType,
    pub source: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Relevance in `[0.0, 1.0]`.
    pub relevance_score: f64,
    #[serde(default)]
    pub metadata: Value,
    /// Per-signal breakdown, present only when explicitly requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explain: Option<ScoreBreakdown>,
}

impl SearchResult {
    pub fn from_item(item: &KnowledgeItem, relevance_score: f64) -> Self {
        Self {
            id: item.id.clone(),
            title: item.title.clone(),
            content: item.content.clone(),
            item_type: item.item_type,
            source: item.source_label().to_string(),
            tags: item.tags().to_vec(),
            relevance_score,
            metadata: item.metadata.clone(),
            explain: None,
        }
    }
}

/// Generation settings stored per chatbot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatbotSettings {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    1000
}

impl Default for ChatbotSettings {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// The parts of a chatbot the chat flow needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chatbot {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// System prompt handed to the generation collaborator.
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub welcome_message: Option<String>,
    #[serde(default)]
    pub fallback_message: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub settings: ChatbotSettings,
}

fn default_active() -> bool {
    true
}

impl Chatbot {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            prompt: prompt.into(),
            welcome_message: None,
            fallback_message: None,
            is_active: true,
            settings: ChatbotSettings::default(),
        }
    }
}

/// Speaker of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Lowercase name used in prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// Storage label (`"USER"`, ...).
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
            Role::System => "SYSTEM",
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "ASSISTANT" => Role::Assistant,
            "SYSTEM" => Role::System,
            _ => Role::User,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// An active conversation between one session and one chatbot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub chatbot_id: String,
    pub session_id: String,
    pub user_id: Option<String>,
}
