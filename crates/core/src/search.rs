//! Conversation search query language and ranking
//!
//! Queries are matched by linear scan against each record's lowercase
//! `search_text`. Supported syntax:
//! - `"exact phrase"`: every phrase must appear
//! - `-term`: records containing the term are dropped
//! - `title:x`, `content:x`, `tag:x`, `provider:x`: field filters
//! - `OR` / `AND` between plain terms (AND is the default)
//!
//! Plain terms longer than four characters also match words within edit
//! distance 2, so small typos still find the conversation.

use crate::db::Conversation;

const DAY_MS: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Content,
    Tag,
    Provider,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "title" => Some(Field::Title),
            "content" => Some(Field::Content),
            "tag" => Some(Field::Tag),
            "provider" => Some(Field::Provider),
            _ => None,
        }
    }

    fn text(self, conv: &Conversation) -> String {
        match self {
            Field::Title => conv.title.to_lowercase(),
            Field::Content => conv.content.to_lowercase(),
            Field::Tag => conv.tags.join(" ").to_lowercase(),
            Field::Provider => conv.provider.to_lowercase(),
        }
    }
}

/// A parsed search query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub terms:         Vec<String>,
    pub exact_phrases: Vec<String>,
    pub exclude_terms: Vec<String>,
    pub field_filters: Vec<(Field, Vec<String>)>,
    pub operator:      Operator,
}

impl SearchQuery {
    pub fn parse(text: &str) -> Self {
        let (exact_phrases, remaining) = extract_phrases(text);

        let mut query = SearchQuery {
            terms: Vec::new(),
            exact_phrases,
            exclude_terms: Vec::new(),
            field_filters: Vec::new(),
            operator: Operator::And,
        };

        for token in remaining.split_whitespace() {
            let lower = token.to_lowercase();

            if let Some((name, rest)) = lower.split_once(':') {
                let value = rest.split(':').next().unwrap_or_default();
                if let (Some(field), false) = (Field::parse(name), value.is_empty()) {
                    query.add_filter(field, value.to_string());
                    continue;
                }
            }

            if lower.starts_with('-') || lower == "not" {
                if let Some(term) = lower.strip_prefix('-').filter(|t| !t.is_empty()) {
                    query.exclude_terms.push(term.to_string());
                }
                continue;
            }

            match lower.as_str() {
                "or" => query.operator = Operator::Or,
                "and" => query.operator = Operator::And,
                _ => query.terms.push(lower),
            }
        }

        query
    }

    fn add_filter(&mut self, field: Field, value: String) {
        match self.field_filters.iter_mut().find(|(f, _)| *f == field) {
            Some((_, values)) => values.push(value),
            None => self.field_filters.push((field, vec![value])),
        }
    }

    pub fn matches(&self, conv: &Conversation) -> bool {
        let haystack = &conv.search_text;

        if self.exclude_terms.iter().any(|t| haystack.contains(t.as_str())) {
            return false;
        }

        if !self.exact_phrases.iter().all(|p| haystack.contains(p.as_str())) {
            return false;
        }

        for (field, values) in &self.field_filters {
            let text = field.text(conv);
            if !values.iter().any(|v| text.contains(v.as_str()) || fuzzy_match(&text, v)) {
                return false;
            }
        }

        if self.terms.is_empty() {
            return true;
        }

        let term_matches = |term: &String| haystack.contains(term.as_str()) || fuzzy_match(haystack, term);
        match self.operator {
            Operator::Or => self.terms.iter().any(term_matches),
            Operator::And => self.terms.iter().all(term_matches),
        }
    }

    /// Relevance: title > tags > notes > content, plus phrase, filter and recency boosts
    pub fn score(&self, conv: &Conversation, now_ms: i64) -> i64 {
        let title = conv.title.to_lowercase();
        let tags = conv.tags.join(" ").to_lowercase();
        let notes = conv.notes.to_lowercase();
        let content = conv.content.to_lowercase();

        let mut score = 0;
        for term in self.terms.iter().chain(&self.exact_phrases) {
            let term = term.as_str();
            if title.contains(term) {
                score += 10;
            }
            if tags.contains(term) {
                score += 5;
            }
            if notes.contains(term) {
                score += 3;
            }
            if content.contains(term) {
                score += 1;
            }
        }

        score += 5 * self.field_filters.len() as i64;
        score += 8 * self.exact_phrases.len() as i64;

        let age_days = now_ms.saturating_sub(conv.timestamp) as f64 / DAY_MS;
        if age_days < 7.0 {
            score += 3;
        } else if age_days < 30.0 {
            score += 1;
        }

        score
    }

    /// Filter `conversations` and order them by relevance, newest first on ties
    pub fn rank(&self, conversations: Vec<Conversation>, now_ms: i64) -> Vec<Conversation> {
        let mut scored: Vec<(i64, Conversation)> = conversations
            .into_iter()
            .filter(|conv| self.matches(conv))
            .map(|conv| (self.score(&conv, now_ms), conv))
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then(b.timestamp.cmp(&a.timestamp)));
        scored.into_iter().map(|(_, conv)| conv).collect()
    }
}

/// Split out `"quoted phrases"`, returning them lowercased with the rest of the text
fn extract_phrases(text: &str) -> (Vec<String>, String) {
    let mut phrases = Vec::new();
    let mut remaining = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('"') {
        let after = &rest[start + 1..];
        match after.find('"') {
            Some(0) => {
                remaining.push_str(&rest[..start]);
                remaining.push(' ');
                rest = &after[1..];
            },
            Some(end) => {
                remaining.push_str(&rest[..start]);
                remaining.push(' ');
                phrases.push(after[..end].to_lowercase());
                rest = &after[end + 1..];
            },
            None => break,
        }
    }
    remaining.push_str(rest);

    (phrases, remaining)
}

/// True when some word of `text` is within edit distance 2 of `term`
///
/// Short terms (four characters or fewer) never fuzzy-match.
pub fn fuzzy_match(text: &str, term: &str) -> bool {
    if term.chars().count() <= 4 {
        return false;
    }
    text.split_whitespace()
        .any(|word| levenshtein_distance(word, term) <= 2)
}

pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::db::conversations::generate_search_text;

    fn conversation(title: &str, content: &str, tags: &[&str], timestamp: i64) -> Conversation {
        let mut conv = Conversation {
            id: 1,
            title: title.to_string(),
            content: content.to_string(),
            provider: "claude".to_string(),
            timestamp,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            is_favorite: false,
            notes: String::new(),
            conversation_id: String::new(),
            url: String::new(),
            modified_at: timestamp,
            search_text: String::new(),
            extra: Map::new(),
        };
        conv.search_text = generate_search_text(&conv);
        conv
    }

    #[test]
    fn test_parse_plain_terms() {
        let query = SearchQuery::parse("Rust  Async");
        assert_eq!(query.terms, vec!["rust", "async"]);
        assert_eq!(query.operator, Operator::And);
    }

    #[test]
    fn test_parse_operators_and_filters() {
        let query = SearchQuery::parse(r#""error handling" tag:rust -python foo OR bar provider:claude"#);
        assert_eq!(query.exact_phrases, vec!["error handling"]);
        assert_eq!(query.exclude_terms, vec!["python"]);
        assert_eq!(query.terms, vec!["foo", "bar"]);
        assert_eq!(query.operator, Operator::Or);
        assert_eq!(
            query.field_filters,
            vec![
                (Field::Tag, vec!["rust".to_string()]),
                (Field::Provider, vec!["claude".to_string()]),
            ]
        );
    }

    #[test]
    fn test_parse_unknown_field_is_a_term() {
        let query = SearchQuery::parse("http://example.com");
        assert_eq!(query.terms, vec!["http://example.com"]);
        assert!(query.field_filters.is_empty());
    }

    #[test]
    fn test_parse_drops_bare_dash_and_not() {
        let query = SearchQuery::parse("- not rust");
        assert_eq!(query.terms, vec!["rust"]);
        assert!(query.exclude_terms.is_empty());
    }

    #[test]
    fn test_extract_phrases_handles_unclosed_quote() {
        let (phrases, rest) = extract_phrases(r#"say "hello world" and "oops"#);
        assert_eq!(phrases, vec!["hello world"]);
        assert!(rest.contains("\"oops"));
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        let conv = conversation("Greeting", "Hello World", &[], 0);
        assert!(SearchQuery::parse("HELLO").matches(&conv));
        assert!(SearchQuery::parse("hello").matches(&conv));
    }

    #[test]
    fn test_exclude_and_phrase() {
        let conv = conversation("Notes", "the quick brown fox", &[], 0);
        assert!(SearchQuery::parse(r#""quick brown""#).matches(&conv));
        assert!(!SearchQuery::parse(r#""brown quick""#).matches(&conv));
        assert!(!SearchQuery::parse("quick -fox").matches(&conv));
    }

    #[test]
    fn test_and_versus_or() {
        let conv = conversation("Notes", "apples only", &[], 0);
        assert!(!SearchQuery::parse("apples pears").matches(&conv));
        assert!(SearchQuery::parse("apples OR pears").matches(&conv));
    }

    #[test]
    fn test_field_filter() {
        let conv = conversation("Deploy notes", "kubernetes", &["ops"], 0);
        assert!(SearchQuery::parse("tag:ops").matches(&conv));
        assert!(!SearchQuery::parse("title:kubernetes").matches(&conv));
        assert!(SearchQuery::parse("content:kubernetes").matches(&conv));
    }

    #[test]
    fn test_fuzzy_typo_tolerance() {
        let conv = conversation("Notes", "understanding lifetimes", &[], 0);
        assert!(SearchQuery::parse("lifetmes").matches(&conv));
        assert!(!SearchQuery::parse("lfe").matches(&conv));
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("same", "same"), 0);
    }

    #[test]
    fn test_rank_prefers_title_hits_then_recency() {
        let now = 100 * DAY_MS as i64;
        let mut in_content = conversation("Other", "rust rust", &[], now - 60 * DAY_MS as i64);
        in_content.id = 1;
        let mut in_title = conversation("Rust tips", "misc", &[], now - 60 * DAY_MS as i64);
        in_title.id = 2;
        let mut recent = conversation("Other", "rust", &[], now);
        recent.id = 3;

        let ranked = SearchQuery::parse("rust").rank(vec![in_content, in_title, recent], now);
        let ids: Vec<i64> = ranked.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_empty_query_matches_everything() {
        let conv = conversation("a", "b", &[], 0);
        assert!(SearchQuery::parse("   ").matches(&conv));
    }

    #[test]
    fn test_score_tolerates_extreme_timestamps() {
        let query = SearchQuery::parse("hello");
        let ancient = conversation("hello", "x", &[], i64::MIN);
        let future = conversation("hello", "x", &[], i64::MAX);

        assert!(query.score(&ancient, i64::MAX) > 0);
        assert!(query.score(&future, i64::MIN) > 0);
    }
}
