//! # knowbase
//!
//! Knowledge-base retrieval and chat for customer-service chatbots.
//!
//! Each chatbot owns a set of knowledge items. A query is ranked against
//! that set with the lexical scorer from [`knowbase_core`]; the best items
//! are exposed through a search endpoint and injected as context into
//! generated chat replies.
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────────┐
//! │  SQLite  │──▶│  retrieval   │──▶│  search    │
//! │  store   │   │ (core crate) │   │  endpoint  │
//! └────┬─────┘   └──────┬───────┘   └────────────┘
//!      │                ▼
//!      │         ┌──────────────┐   ┌────────────┐
//!      └────────▶│  chat flow   │──▶│ generation │
//!                └──────────────┘   └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite store implementations |
//! | [`search`] | Search shared by CLI and HTTP |
//! | [`generation`] | Generation backends |
//! | [`chat`] | One chat turn |
//! | [`import`] | JSON seed import |
//! | [`server`] | HTTP server |

pub mod chat;
pub mod config;
pub mod db;
pub mod generation;
pub mod import;
pub mod migrate;
pub mod search;
pub mod server;
pub mod sqlite_store;
