//! Knowledge search shared by `knowbase search` and `POST /knowledge-base/search`.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use knowbase_core::context::{extract_snippet, SNIPPET_LEN};
use knowbase_core::models::SearchResult;
use knowbase_core::search::{retrieve, SearchParams};
use knowbase_core::store::KnowledgeStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Response shape of the search endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total: usize,
    pub query: String,
    pub chatbot_id: String,
}

/// Options a caller may override on top of the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct SearchOverrides {
    pub limit: Option<usize>,
    pub threshold: Option<f64>,
    pub explain: bool,
}

impl SearchOverrides {
    pub fn resolve(&self, defaults: SearchParams) -> Result<SearchParams> {
        let threshold = self.threshold.unwrap_or(defaults.threshold);
        if !(0.0..=1.0).contains(&threshold) {
            bail!("threshold must be in [0.0, 1.0], got {}", threshold);
        }
        Ok(SearchParams::new(self.limit.unwrap_or(defaults.limit), threshold)
            .with_explain(self.explain))
    }
}

/// Rank a chatbot's knowledge for `query`.
///
/// Returns `None` when the chatbot does not exist.
pub async fn search_knowledge(
    store: &dyn KnowledgeStore,
    chatbot_id: &str,
    query: &str,
    params: &SearchParams,
) -> Result<Option<SearchResponse>> {
    if store.get_chatbot(chatbot_id).await?.is_none() {
        return Ok(None);
    }

    let results = retrieve(store, chatbot_id, query, params).await?;

    Ok(Some(SearchResponse {
        total: results.len(),
        results,
        query: query.to_string(),
        chatbot_id: chatbot_id.to_string(),
    }))
}

pub async fn run_search(
    config: &Config,
    chatbot_id: &str,
    query: &str,
    overrides: &SearchOverrides,
    json: bool,
) -> Result<()> {
    let params = overrides.resolve(config.retrieval.search_params())?;

    if query.trim().is_empty() && !json {
        println!("No results.");
        return Ok(());
    }

    let store = SqliteStore::new(db::connect(config).await?);
    let response = search_knowledge(&store, chatbot_id, query, &params).await;
    store.close().await;
    let Some(response) = response? else {
        bail!("chatbot not found: {}", chatbot_id);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in response.results.iter().enumerate() {
        let title = if result.title.is_empty() {
            "(untitled)"
        } else {
            result.title.as_str()
        };
        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            result.relevance_score,
            result.item_type.as_str(),
            title
        );
        println!("    source: {}", result.source);
        if !result.tags.is_empty() {
            println!("    tags: {}", result.tags.join(", "));
        }
        println!(
            "    excerpt: \"{}\"",
            extract_snippet(&result.content, query, SNIPPET_LEN)
                .replace('\n', " ")
                .trim()
        );
        if let Some(explain) = &result.explain {
            println!(
                "    explain: title={:.1}+{:.1} content={:.1}+{:.1} tags={:.2} type={:.0}",
                explain.title_exact,
                explain.title_coverage,
                explain.content_exact,
                explain.content_coverage,
                explain.tags,
                explain.type_bonus
            );
        }
        println!("    id: {}", result.id);
        println!();
    }

    Ok(())
}
