//! Lexical relevance scoring of knowledge items against a query.
//!
//! The scorer is a pure function: additive raw points against a fixed
//! ceiling of [`MAX_RAW_SCORE`], normalized to `[0.0, 1.0]`.
//!
//! | Signal | Condition | Raw points |
//! |--------|-----------|------------|
//! | Title exact | lowercased title contains the lowercased query | 40 |
//! | Content exact | lowercased content contains the lowercased query | 20 |
//! | Title coverage | fraction of query words found in the title × 30 | ≤ 30 |
//! | Content coverage | fraction of query words found in the content × 20 | ≤ 20 |
//! | Tags | see [`tag_points`] | ≤ 25 |
//! | Type | `DOCUMENT` 5, `FAQ` 3 | ≤ 5 |
//!
//! A blank query never produces an exact-substring match, so it cannot
//! trivially score every item.

use serde::{Deserialize, Serialize};

use crate::models::{ItemType, KnowledgeItem};

pub const MAX_RAW_SCORE: f64 = 100.0;

const TITLE_EXACT_POINTS: f64 = 40.0;
const CONTENT_EXACT_POINTS: f64 = 20.0;
const TITLE_COVERAGE_POINTS: f64 = 30.0;
const CONTENT_COVERAGE_POINTS: f64 = 20.0;
const TAG_POINTS: f64 = 25.0;
const WHOLE_TAG_UNITS: f64 = 1.0;
const WORD_TAG_UNITS: f64 = 0.5;

/// Words must be longer than this many characters to count as query words.
pub const MIN_WORD_CHARS: usize = 2;

/// A query with its derived forms, computed once per search.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    raw: String,
    lower: String,
    words: Vec<String>,
}

impl Query {
    pub fn parse(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        let words = query_words(&lower);
        Self {
            raw: raw.to_string(),
            lower,
            words,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn lower(&self) -> &str {
        &self.lower
    }

    /// Query words longer than [`MIN_WORD_CHARS`], in query order. Repeats are kept.
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// True when the query is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.lower.trim().is_empty()
    }

    fn found_in(&self, haystack_lower: &str) -> bool {
        !self.is_blank() && haystack_lower.contains(self.lower.as_str())
    }
}

/// Split a lowercased query on whitespace, keeping words longer than
/// [`MIN_WORD_CHARS`] characters. A repeated word counts once per occurrence.
pub fn query_words(lower: &str) -> Vec<String> {
    lower
        .split_whitespace()
        .filter(|word| word.chars().count() > MIN_WORD_CHARS)
        .map(str::to_string)
        .collect()
}

/// Raw points contributed by each signal for one (query, item) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub title_exact: f64,
    pub content_exact: f64,
    pub title_coverage: f64,
    pub content_coverage: f64,
    pub tags: f64,
    pub type_bonus: f64,
}

impl ScoreBreakdown {
    /// Sum of all raw points.
    pub fn raw(&self) -> f64 {
        self.title_exact
            + self.content_exact
            + self.title_coverage
            + self.content_coverage
            + self.tags
            + self.type_bonus
    }

    /// Raw points divided by [`MAX_RAW_SCORE`], clamped to `[0.0, 1.0]`.
    pub fn normalized(&self) -> f64 {
        (self.raw() / MAX_RAW_SCORE).clamp(0.0, 1.0)
    }
}

/// Compute the per-signal breakdown for an item.
pub fn explain(query: &Query, item: &KnowledgeItem) -> ScoreBreakdown {
    let title = item.title.to_lowercase();
    let content = item.content.to_lowercase();

    ScoreBreakdown {
        title_exact: if query.found_in(&title) { TITLE_EXACT_POINTS } else { 0.0 },
        content_exact: if query.found_in(&content) { CONTENT_EXACT_POINTS } else { 0.0 },
        title_coverage: coverage(query.words(), &title) * TITLE_COVERAGE_POINTS,
        content_coverage: coverage(query.words(), &content) * CONTENT_COVERAGE_POINTS,
        tags: tag_points(query, item.tags()),
        type_bonus: type_bonus(item.item_type),
    }
}

/// Relevance of `item` to `query`, in `[0.0, 1.0]`.
pub fn score(query: &Query, item: &KnowledgeItem) -> f64 {
    explain(query, item).normalized()
}

/// Fraction of `words` that occur anywhere in `haystack`. Zero when there
/// are no words.
fn coverage(words: &[String], haystack: &str) -> f64 {
    if words.is_empty() {
        return 0.0;
    }
    let matched = words
        .iter()
        .filter(|w| haystack.contains(w.as_str()))
        .count();
    matched as f64 / words.len() as f64
}

/// Tag relevance in raw points, capped at 25.
///
/// Each lowercased tag earns 1.0 unit when the query contains it or it
/// contains the query, plus 0.5 units per query word found inside it. The
/// contribution is `min(units / tag_count × 25, 25)`.
pub fn tag_points(query: &Query, tags: &[String]) -> f64 {
    if tags.is_empty() {
        return 0.0;
    }

    let units: f64 = tags
        .iter()
        .map(|tag| {
            let tag = tag.to_lowercase();
            let whole = if !query.is_blank()
                && (query.lower.contains(tag.as_str()) || tag.contains(query.lower.as_str()))
            {
                WHOLE_TAG_UNITS
            } else {
                0.0
            };
            let partial = query
                .words
                .iter()
                .filter(|w| tag.contains(w.as_str()))
                .count() as f64
                * WORD_TAG_UNITS;
            whole + partial
        })
        .sum();

    (units / tags.len() as f64 * TAG_POINTS).min(TAG_POINTS)
}

fn type_bonus(item_type: ItemType) -> f64 {
    match item_type {
        ItemType::Document => 5.0,
        ItemType::Faq => 3.0,
        _ => 0.0,
    }
}
