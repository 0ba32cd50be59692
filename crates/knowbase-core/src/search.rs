//! Retrieval: score, filter, rank, and bound a chatbot's knowledge items.
//!
//! This is the single implementation shared by the chat flow and the
//! standalone search endpoint. The two differ only in the [`SearchParams`]
//! they pass.
//!
//! # Algorithm
//!
//! 1. Parse the query once ([`Query::parse`]).
//! 2. Score every item (on the rayon pool with the `parallel` feature;
//!    results keep input order either way).
//! 3. Keep items whose score is strictly greater than the threshold.
//! 4. Stable sort by score, descending. Equal scores keep input order.
//! 5. Truncate to `limit` and project to [`SearchResult`].

use std::cmp::Ordering;

use crate::error::RetrievalError;
use crate::models::{KnowledgeItem, SearchResult};
use crate::scoring::{explain, Query, ScoreBreakdown};
use crate::store::KnowledgeStore;

/// Source label that [`combine_sources`] ranks ahead of everything else.
pub const INTERNAL_SOURCE: &str = "internal";

/// Default cap for [`combine_sources`].
pub const COMBINED_LIMIT: usize = 10;

/// Result bounds for one search invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    /// Maximum number of results.
    pub limit: usize,
    /// Items must score strictly above this value.
    pub threshold: f64,
    /// Attach a [`ScoreBreakdown`] to each result.
    pub explain: bool,
}

impl SearchParams {
    /// Recall-oriented bounds for prompt context in the chat flow.
    pub const CHAT_CONTEXT: SearchParams = SearchParams {
        limit: 5,
        threshold: 0.1,
        explain: false,
    };

    /// Precision-oriented defaults for the user-facing search endpoint.
    pub const SEARCH_ENDPOINT: SearchParams = SearchParams {
        limit: 10,
        threshold: 0.3,
        explain: false,
    };

    pub fn new(limit: usize, threshold: f64) -> Self {
        Self {
            limit,
            threshold,
            explain: false,
        }
    }

    pub fn with_explain(mut self, explain: bool) -> Self {
        self.explain = explain;
        self
    }
}

/// Rank `items` against `query`.
///
/// Never fails: malformed items were already normalized when they were
/// built, so each one simply scores on whatever text it has.
pub fn search(query: &str, items: &[KnowledgeItem], params: &SearchParams) -> Vec<SearchResult> {
    let query = Query::parse(query);
    let breakdowns = score_all(&query, items);

    let mut kept: Vec<(&KnowledgeItem, ScoreBreakdown, f64)> = items
        .iter()
        .zip(breakdowns)
        .filter_map(|(item, breakdown)| {
            let score = breakdown.normalized();
            (score > params.threshold).then_some((item, breakdown, score))
        })
        .collect();

    kept.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal));
    kept.truncate(params.limit);

    kept.into_iter()
        .map(|(item, breakdown, score)| {
            let mut result = SearchResult::from_item(item, score);
            if params.explain {
                result.explain = Some(breakdown);
            }
            result
        })
        .collect()
}

#[cfg(feature = "parallel")]
fn score_all(query: &Query, items: &[KnowledgeItem]) -> Vec<ScoreBreakdown> {
    use rayon::prelude::*;
    items.par_iter().map(|item| explain(query, item)).collect()
}

#[cfg(not(feature = "parallel"))]
fn score_all(query: &Query, items: &[KnowledgeItem]) -> Vec<ScoreBreakdown> {
    items.iter().map(|item| explain(query, item)).collect()
}

/// Fetch a chatbot's knowledge snapshot from `store` and rank it.
///
/// A store failure is reported as [`RetrievalError::Store`]; callers decide
/// whether to degrade to an empty result set.
pub async fn retrieve<S>(
    store: &S,
    chatbot_id: &str,
    query: &str,
    params: &SearchParams,
) -> Result<Vec<SearchResult>, RetrievalError>
where
    S: KnowledgeStore + ?Sized,
{
    let items = store
        .fetch_knowledge_items(chatbot_id)
        .await
        .map_err(RetrievalError::Store)?;

    let results = search(query, &items, params);

    tracing::debug!(
        chatbot_id,
        candidates = items.len(),
        results = results.len(),
        threshold = params.threshold,
        "knowledge retrieval complete"
    );

    Ok(results)
}

/// Merge internal and external results, internal first, capped at `cap`.
///
/// Relative order within each group is preserved.
pub fn combine_sources(
    internal: Vec<SearchResult>,
    external: Vec<SearchResult>,
    cap: usize,
) -> Vec<SearchResult> {
    let mut combined: Vec<SearchResult> = internal.into_iter().chain(external).collect();
    combined.sort_by_key(|r| r.source != INTERNAL_SOURCE);
    combined.truncate(cap);
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemType;
    use crate::scoring::score;

    fn numbered_items(n: usize) -> Vec<KnowledgeItem> {
        (0..n)
            .map(|i| KnowledgeItem::new(format!("k{}", i), format!("Item {}", i), "filler text"))
            .collect()
    }

    #[test]
    fn test_strict_threshold_boundary() {
        // Title exact (40) + title coverage (30) = 0.70 exactly.
        let items = vec![KnowledgeItem::new("k1", "Horário de Funcionamento", "")];
        let q = "horário de funcionamento";
        let s = score(&Query::parse(q), &items[0]);
        assert!((s - 0.70).abs() < 1e-12);

        assert!(search(q, &items, &SearchParams::new(10, s)).is_empty());
        assert_eq!(search(q, &items, &SearchParams::new(10, s - 1e-9)).len(), 1);
    }

    #[test]
    fn test_limit_bounds_results() {
        let items: Vec<KnowledgeItem> = (0..8)
            .map(|i| KnowledgeItem::new(format!("k{}", i), "Entrega", "prazo de entrega"))
            .collect();
        assert_eq!(search("entrega", &items, &SearchParams::new(3, 0.1)).len(), 3);
        assert_eq!(search("entrega", &items, &SearchParams::new(20, 0.1)).len(), 8);
        assert!(search("entrega", &items, &SearchParams::new(0, 0.1)).is_empty());
    }

    #[test]
    fn test_five_of_twenty_sorted_descending() {
        let mut items = numbered_items(20);
        // Five qualifying items with distinct scores, scattered through the list.
        items[2] = KnowledgeItem::new("a", "Pagamento", "");
        items[5] = KnowledgeItem::new("b", "Pagamento", "").with_type(ItemType::Faq);
        items[9] = KnowledgeItem::new("c", "Pagamento", "").with_type(ItemType::Document);
        items[13] = KnowledgeItem::new("d", "Pagamento", "").with_tags(["pagamento"]);
        items[17] = KnowledgeItem::new("e", "Pagamento", "pagamento").with_type(ItemType::Document);

        let results = search("pagamento", &items, &SearchParams::SEARCH_ENDPOINT);
        assert_eq!(results.len(), 5);
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["e", "d", "c", "b", "a"]);
        for pair in results.windows(2) {
            assert!(pair[0].relevance_score > pair[1].relevance_score);
        }
    }

    #[test]
    fn test_ties_keep_input_order() {
        let items: Vec<KnowledgeItem> = ["x", "y", "z"]
            .iter()
            .map(|id| KnowledgeItem::new(*id, "Devolução", ""))
            .collect();
        let results = search("devolução", &items, &SearchParams::CHAT_CONTEXT);
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_search_is_idempotent() {
        let mut items = numbered_items(30);
        items.push(KnowledgeItem::new("p", "Pix", "pagamento via pix").with_tags(["pix"]));
        items.push(KnowledgeItem::new("q", "Boleto", "pagamento via boleto"));
        let first = search("pagamento pix", &items, &SearchParams::CHAT_CONTEXT);
        let second = search("pagamento pix", &items, &SearchParams::CHAT_CONTEXT);
        assert_eq!(first, second);
        assert_eq!(first[0].id, "p");
    }

    #[test]
    fn test_projection_copies_tags_and_source() {
        let items = vec![KnowledgeItem::new("k", "Impressora", "")
            .with_source("manual.pdf")
            .with_tags(["Hardware"])];
        let results = search("impressora", &items, &SearchParams::SEARCH_ENDPOINT);
        assert_eq!(results[0].tags, vec!["Hardware".to_string()]);
        assert_eq!(results[0].source, "manual.pdf");
        assert!(results[0].explain.is_none());
    }

    #[test]
    fn test_explain_attached_on_request() {
        let items = vec![KnowledgeItem::new("k", "Impressora", "")];
        let params = SearchParams::SEARCH_ENDPOINT.with_explain(true);
        let results = search("impressora", &items, &params);
        let breakdown = results[0].explain.expect("breakdown requested");
        assert_eq!(breakdown.title_exact, 40.0);
        assert!((breakdown.normalized() - results[0].relevance_score).abs() < 1e-12);
    }

    #[test]
    fn test_empty_query_matches_nothing_at_default_thresholds() {
        let items = vec![
            KnowledgeItem::new("a", "Anything", "at all").with_type(ItemType::Document),
            KnowledgeItem::new("b", "", ""),
        ];
        assert!(search("", &items, &SearchParams::CHAT_CONTEXT).is_empty());
        assert!(search("", &items, &SearchParams::SEARCH_ENDPOINT).is_empty());
    }

    #[test]
    fn test_combine_sources_internal_first() {
        let make = |id: &str, source: &str| {
            SearchResult::from_item(&KnowledgeItem::new(id, "t", "c").with_source(source), 0.5)
        };
        let internal = vec![make("i1", "internal"), make("f1", "faq.csv")];
        let external = vec![make("e1", "api"), make("i2", "internal")];
        let combined = combine_sources(internal, external, 3);
        let ids: Vec<&str> = combined.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["i1", "i2", "f1"]);
    }
}
