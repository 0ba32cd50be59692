//! SQLite connection pool.
//!
//! WAL mode is enabled so the HTTP server can read knowledge snapshots
//! while imports write. Foreign keys are enforced, so knowledge items and
//! conversations must belong to an existing chatbot.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::config::Config;
use crate::migrate::apply_schema;
use crate::sqlite_store::SqliteStore;

/// Connections per pool. The server shares one pool across handlers.
pub const POOL_SIZE: u32 = 5;

/// Connect to the database named in `[db] path`.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    connect_path(&config.db.path).await
}

/// Connect to the database file at `path`, creating the file and its parent
/// directories when missing.
pub async fn connect_path(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(POOL_SIZE)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))?;

    tracing::debug!(path = %path.display(), "database opened");
    Ok(pool)
}

/// Connect to `path`, make sure the schema exists, and wrap the pool in a
/// [`SqliteStore`].
pub async fn open_store(path: &Path) -> Result<SqliteStore> {
    let pool = connect_path(path).await?;
    apply_schema(&pool).await?;
    Ok(SqliteStore::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use knowbase_core::models::{Chatbot, KnowledgeItem};
    use knowbase_core::store::KnowledgeStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_connect_path_creates_nested_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a/b/kb.sqlite");
        let pool = connect_path(&path).await.unwrap();
        assert!(path.exists());
        pool.close().await;
    }

    #[tokio::test]
    async fn test_items_require_existing_chatbot() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp.path().join("kb.sqlite")).await.unwrap();
        let item = KnowledgeItem::new("k1", "Título", "Conteúdo");

        assert!(store.insert_knowledge_item("ghost", &item).await.is_err());

        store.upsert_chatbot(&Chatbot::new("ghost", "")).await.unwrap();
        store.insert_knowledge_item("ghost", &item).await.unwrap();
        assert_eq!(store.fetch_knowledge_items("ghost").await.unwrap().len(), 1);
    }
}
