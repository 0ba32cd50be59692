//! # knowbase core
//!
//! Shared logic for knowbase: knowledge item models, the lexical relevance
//! scorer, the retrieval service, prompt context assembly, and the store
//! traits the application implements.
//!
//! This crate has no tokio, sqlx, or HTTP dependencies.
//!
//! ```rust
//! use knowbase_core::context::assemble;
//! use knowbase_core::models::KnowledgeItem;
//! use knowbase_core::search::{search, SearchParams};
//!
//! let items = vec![KnowledgeItem::new("k1", "Horário de Funcionamento", "8h às 18h")];
//! let results = search("horário de funcionamento", &items, &SearchParams::CHAT_CONTEXT);
//! assert_eq!(results.len(), 1);
//! assert_eq!(assemble(&results), vec!["**Horário de Funcionamento**\n8h às 18h"]);
//! ```

pub mod context;
pub mod embedding;
pub mod error;
pub mod models;
pub mod scoring;
pub mod search;
pub mod store;

pub use error::RetrievalError;
pub use models::{KnowledgeItem, SearchResult};
pub use search::{search, SearchParams};
