//! Embedding provider trait and an in-memory vector index.
//!
//! This is an optional extension point. The chat flow and the search
//! endpoint rank lexically through [`crate::search`]; nothing here is on
//! their path. A caller that wants semantic lookup embeds its items with an
//! [`EmbeddingProvider`], builds a [`VectorIndex`], and queries it with
//! [`VectorIndex::search_similar`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::cmp::Ordering;

use crate::models::KnowledgeItem;

/// Default minimum cosine similarity for [`VectorIndex::search_similar`].
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.8;

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors
/// of different lengths, or zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Brute-force cosine index over knowledge item vectors.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dims: usize,
    entries: Vec<(String, Vec<f32>)>,
}

impl VectorIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            entries: Vec::new(),
        }
    }

    /// Embed `title\ncontent` for every item and index the vectors.
    pub async fn build<P>(provider: &P, items: &[KnowledgeItem]) -> Result<Self>
    where
        P: EmbeddingProvider + ?Sized,
    {
        let texts: Vec<String> = items
            .iter()
            .map(|item| format!("{}\n{}", item.title, item.content))
            .collect();
        let vectors = provider.embed(&texts).await?;
        if vectors.len() != items.len() {
            bail!(
                "embedding provider returned {} vectors for {} items",
                vectors.len(),
                items.len()
            );
        }

        let mut index = Self::new(provider.dims());
        for (item, vector) in items.iter().zip(vectors) {
            index.insert(&item.id, vector)?;
        }
        Ok(index)
    }

    /// Insert or replace the vector for `item_id`.
    pub fn insert(&mut self, item_id: &str, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dims {
            bail!(
                "vector for {} has {} dims, index expects {}",
                item_id,
                vector.len(),
                self.dims
            );
        }
        match self.entries.iter_mut().find(|(id, _)| id == item_id) {
            Some(entry) => entry.1 = vector,
            None => self.entries.push((item_id.to_string(), vector)),
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Item ids whose similarity to `query` is strictly above `threshold`,
    /// most similar first, at most `limit` of them.
    pub fn search_similar(&self, query: &[f32], threshold: f32, limit: usize) -> Vec<(String, f32)> {
        let mut hits: Vec<(String, f32)> = self
            .entries
            .iter()
            .map(|(id, v)| (id.clone(), cosine_similarity(query, v)))
            .filter(|(_, sim)| *sim > threshold)
            .collect();
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        hits.truncate(limit);
        hits
    }
}
