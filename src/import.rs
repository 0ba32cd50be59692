//! Seed the database from a JSON file.
//!
//! ```json
//! {
//!   "chatbots": [
//!     { "id": "loja", "name": "Loja", "prompt": "Você atende uma loja.",
//!       "fallbackMessage": "Desculpe, não entendi." }
//!   ],
//!   "knowledgeItems": [
//!     { "chatbotId": "loja", "id": "k1", "title": "Horário", "content": "8h às 18h",
//!       "type": "FAQ", "metadata": { "tags": ["horário"] } }
//!   ]
//! }
//! ```
//!
//! Chatbots are upserted before items. Items referencing a chatbot that is
//! neither in the file nor in the database are rejected.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use knowbase_core::models::{Chatbot, KnowledgeItem};
use knowbase_core::store::KnowledgeStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedFile {
    #[serde(default)]
    pub chatbots: Vec<Chatbot>,
    #[serde(default)]
    pub knowledge_items: Vec<SeedItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedItem {
    pub chatbot_id: String,
    #[serde(flatten)]
    pub item: KnowledgeItem,
}

#[derive(Debug, Default, PartialEq)]
pub struct ImportStats {
    pub chatbots: usize,
    pub items: usize,
}

pub fn parse_seed(content: &str) -> Result<SeedFile> {
    serde_json::from_str(content).with_context(|| "Failed to parse seed file")
}

/// Write a parsed seed into `store`.
pub async fn import_seed(store: &dyn KnowledgeStore, seed: &SeedFile) -> Result<ImportStats> {
    let mut stats = ImportStats::default();
    let mut known: HashSet<&str> = HashSet::new();

    for chatbot in &seed.chatbots {
        store.upsert_chatbot(chatbot).await?;
        known.insert(chatbot.id.as_str());
        stats.chatbots += 1;
    }

    for entry in &seed.knowledge_items {
        if !known.contains(entry.chatbot_id.as_str()) {
            if store.get_chatbot(&entry.chatbot_id).await?.is_none() {
                bail!(
                    "knowledge item '{}' references unknown chatbot '{}'",
                    entry.item.id,
                    entry.chatbot_id
                );
            }
            known.insert(entry.chatbot_id.as_str());
        }
        store.insert_knowledge_item(&entry.chatbot_id, &entry.item).await?;
        stats.items += 1;
    }

    Ok(stats)
}

pub async fn run_import(config: &Config, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file: {}", path.display()))?;
    let seed = parse_seed(&content)?;

    let store = SqliteStore::new(db::connect(config).await?);
    let stats = import_seed(&store, &seed).await;
    store.close().await;
    let stats = stats?;

    tracing::info!(chatbots = stats.chatbots, items = stats.items, "import complete");
    println!(
        "Imported {} chatbot(s) and {} knowledge item(s).",
        stats.chatbots, stats.items
    );
    Ok(())
}
