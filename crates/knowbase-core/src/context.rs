//! Prompt context assembly and result presentation helpers.

use regex::Regex;

use crate::models::SearchResult;
use crate::scoring::query_words;

/// Default snippet length, in characters.
pub const SNIPPET_LEN: usize = 200;

/// Characters of leading context kept before the first match in a snippet.
const SNIPPET_LEAD: usize = 50;

const ELLIPSIS: &str = "...";

/// Format results as prompt-ready knowledge blocks, one per result, in order.
///
/// Each block is `**{title}**{tags}\n{content}` where `{tags}` is
/// ` [Tags: a, b]` for tagged results and empty otherwise. No length budget
/// is applied.
pub fn assemble(results: &[SearchResult]) -> Vec<String> {
    results.iter().map(format_block).collect()
}

fn format_block(result: &SearchResult) -> String {
    let tags = if result.tags.is_empty() {
        String::new()
    } else {
        format!(" [Tags: {}]", result.tags.join(", "))
    };
    format!("**{}**{}\n{}", result.title, tags, result.content)
}

/// Case-insensitive matcher for any query word, longest words first.
fn term_pattern(query: &str) -> Option<Regex> {
    let mut words = query_words(&query.to_lowercase());
    if words.is_empty() {
        return None;
    }
    words.sort_by_key(|w| std::cmp::Reverse(w.chars().count()));
    let alternation = words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i)(?:{})", alternation)).ok()
}

/// Wrap every occurrence of a query word in `<mark>` tags, keeping the
/// original casing of the text.
pub fn highlight_terms(text: &str, query: &str) -> String {
    match term_pattern(query) {
        Some(re) => re.replace_all(text, "<mark>$0</mark>").into_owned(),
        None => text.to_string(),
    }
}

/// Extract up to `max_len` characters of `content` around the earliest
/// query-word match, marking cut sides with `...`.
///
/// Without a match the snippet is the start of the content.
pub fn extract_snippet(content: &str, query: &str, max_len: usize) -> String {
    let chars: Vec<char> = content.chars().collect();

    let first_match = term_pattern(query)
        .and_then(|re| re.find(content))
        .map(|m| content[..m.start()].chars().count());

    let Some(first) = first_match else {
        let mut snippet: String = chars.iter().take(max_len).collect();
        if chars.len() > max_len {
            snippet.push_str(ELLIPSIS);
        }
        return snippet;
    };

    let start = first.saturating_sub(SNIPPET_LEAD);
    let end = chars
        .len()
        .min((first + max_len).saturating_sub(SNIPPET_LEAD))
        .max(start);

    let mut snippet = String::new();
    if start > 0 {
        snippet.push_str(ELLIPSIS);
    }
    snippet.extend(&chars[start..end]);
    if end < chars.len() {
        snippet.push_str(ELLIPSIS);
    }
    snippet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KnowledgeItem;

    fn result(title: &str, content: &str, tags: &[&str]) -> SearchResult {
        let item = KnowledgeItem::new("k", title, content).with_tags(tags.iter().copied());
        SearchResult::from_item(&item, 0.9)
    }

    #[test]
    fn test_assemble_with_tags() {
        let blocks = assemble(&[result(
            "Impressora",
            "Desligue e religue.",
            &["hardware", "impressora"],
        )]);
        assert_eq!(
            blocks,
            vec!["**Impressora** [Tags: hardware, impressora]\nDesligue e religue.".to_string()]
        );
    }

    #[test]
    fn test_assemble_without_tags_preserves_order() {
        let blocks = assemble(&[result("B", "second", &[]), result("A", "first", &[])]);
        assert_eq!(blocks, vec!["**B**\nsecond".to_string(), "**A**\nfirst".to_string()]);
    }

    #[test]
    fn test_assemble_empty() {
        assert!(assemble(&[]).is_empty());
    }

    #[test]
    fn test_highlight_keeps_case() {
        let out = highlight_terms("Prazo de Entrega: a entrega leva 5 dias", "entrega");
        assert_eq!(
            out,
            "Prazo de <mark>Entrega</mark>: a <mark>entrega</mark> leva 5 dias"
        );
    }

    #[test]
    fn test_highlight_does_not_nest_marks() {
        let out = highlight_terms("mark the market", "mark market");
        assert_eq!(out, "<mark>mark</mark> the <mark>market</mark>");
    }

    #[test]
    fn test_highlight_short_query_is_noop() {
        assert_eq!(highlight_terms("a b c", "a b"), "a b c");
    }

    #[test]
    fn test_highlight_escapes_regex_chars() {
        let out = highlight_terms("price (usd) list", "(usd)");
        assert_eq!(out, "price <mark>(usd)</mark> list");
    }

    #[test]
    fn test_snippet_no_match_truncates() {
        let content = "x".repeat(250);
        let snippet = extract_snippet(&content, "nada", SNIPPET_LEN);
        assert_eq!(snippet.chars().count(), SNIPPET_LEN + 3);
        assert!(snippet.ends_with("..."));

        assert_eq!(extract_snippet("short", "nada", SNIPPET_LEN), "short");
    }

    #[test]
    fn test_snippet_centers_on_first_match() {
        let content = format!("{}entrega{}", "a".repeat(100), "b".repeat(300));
        let snippet = extract_snippet(&content, "entrega", SNIPPET_LEN);
        assert!(snippet.starts_with("..."));
        assert!(snippet.ends_with("..."));
        let body = &snippet[3..snippet.len() - 3];
        assert_eq!(body.chars().count(), SNIPPET_LEN);
        assert!(body.starts_with(&"a".repeat(50)));
        assert!(body[50..].starts_with("entrega"));
    }

    #[test]
    fn test_snippet_is_char_safe() {
        let content = format!("{}horário comercial", "ção ".repeat(30));
        let snippet = extract_snippet(&content, "horário", 60);
        assert!(snippet.contains("horário"));
    }
}
