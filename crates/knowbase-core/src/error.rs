//! Retrieval failures.
//!
//! Kept separate from generation errors: a chat turn can retrieve
//! successfully and still fail to generate, and vice versa.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The knowledge item collection could not be fetched.
    #[error("knowledge store unavailable: {0}")]
    Store(#[source] anyhow::Error),
}
