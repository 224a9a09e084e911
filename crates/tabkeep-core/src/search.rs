//! Fuzzy search over item titles and urls
//!
//! Query syntax follows the usual extended form: whitespace separates tokens
//! and every token must match. A token with a leading `'` is exact and only
//! matches at the start of a word; other tokens also accept substrings,
//! close spellings and in-order subsequences of a word.

use strsim::jaro_winkler;

use crate::models::{Item, ItemId};

/// Minimum Jaro-Winkler similarity for a fuzzy word match
const SIMILARITY_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: ItemId,
    /// Relevance in `0.0..=1.0`, higher is better
    pub score: f64,
}

/// A searchable snapshot of a collection
pub trait SearchIndex {
    /// Rebuild the index from `items`
    fn set_collection(&mut self, items: &[Item]);

    /// Matching items, best first; ties keep collection order
    fn search(&self, query: &str) -> Vec<SearchHit>;
}

/// Relative weight of each searchable field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldWeights {
    pub title: f64,
    pub url: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            title: 0.7,
            url: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    id: ItemId,
    title: Vec<String>,
    url: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// `'word`: matches only where a word starts. Stricter than Fuse's
    /// include-match on purpose.
    Exact(String),
    Fuzzy(String),
}

/// In-memory index scoring each field by its weight
#[derive(Debug, Clone, Default)]
pub struct WeightedIndex {
    weights: FieldWeights,
    entries: Vec<Entry>,
}

impl WeightedIndex {
    pub fn new(weights: FieldWeights) -> Self {
        Self {
            weights,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn score_token(&self, entry: &Entry, token: &Token) -> Option<f64> {
        let title = field_score(&entry.title, token).map(|s| s * self.weights.title);
        let url = field_score(&entry.url, token).map(|s| s * self.weights.url);
        match (title, url) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

impl SearchIndex for WeightedIndex {
    fn set_collection(&mut self, items: &[Item]) {
        self.entries = items
            .iter()
            .map(|item| Entry {
                id: item.id.clone(),
                title: words(&item.title),
                url: words(&item.url),
            })
            .collect();
    }

    fn search(&self, query: &str) -> Vec<SearchHit> {
        let tokens = parse_query(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let max_weight = self.weights.title.max(self.weights.url);
        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let mut total = 0.0;
                for token in &tokens {
                    total += self.score_token(entry, token)?;
                }
                let score = if max_weight > 0.0 {
                    total / (tokens.len() as f64 * max_weight)
                } else {
                    0.0
                };
                Some(SearchHit {
                    id: entry.id.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits
    }
}

fn parse_query(query: &str) -> Vec<Token> {
    query
        .split_whitespace()
        .filter_map(|raw| match raw.strip_prefix('\'') {
            Some(exact) if !exact.is_empty() => Some(Token::Exact(exact.to_lowercase())),
            Some(_) => None,
            None => Some(Token::Fuzzy(raw.to_lowercase())),
        })
        .collect()
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Best score of `token` against any word of a field
fn field_score(words: &[String], token: &Token) -> Option<f64> {
    words
        .iter()
        .filter_map(|word| word_score(word, token))
        .max_by(|a, b| a.total_cmp(b))
}

fn word_score(word: &str, token: &Token) -> Option<f64> {
    match token {
        Token::Exact(t) => word.starts_with(t.as_str()).then_some(1.0),
        Token::Fuzzy(t) => {
            if word.starts_with(t.as_str()) {
                Some(1.0)
            } else if word.contains(t.as_str()) {
                Some(0.9)
            } else {
                let similarity = jaro_winkler(word, t);
                if similarity >= SIMILARITY_THRESHOLD {
                    Some(similarity * 0.8)
                } else if is_subsequence(t, word) {
                    Some(0.5)
                } else {
                    None
                }
            }
        }
    }
}

fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut rest = haystack.chars();
    needle.chars().all(|c| rest.any(|h| h == c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(titles: &[(&str, &str)]) -> WeightedIndex {
        let items: Vec<Item> = titles
            .iter()
            .map(|(id, title)| {
                Item::with_id(*id, format!("https://site.test/{}", id)).titled(*title)
            })
            .collect();
        let mut index = WeightedIndex::default();
        index.set_collection(&items);
        index
    }

    fn ids(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.id.as_str()).collect()
    }

    #[test]
    fn test_exact_token_anchors_at_word_start() {
        let index = index(&[("1", "Foobar"), ("2", "afoo")]);
        assert_eq!(ids(&index.search("'foo")), vec!["1"]);
    }

    #[test]
    fn test_fuzzy_token_matches_substrings() {
        let index = index(&[("1", "Foobar"), ("2", "afoo")]);
        let hits = index.search("foo");
        assert_eq!(ids(&hits), vec!["1", "2"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_fuzzy_tolerates_typos() {
        let index = index(&[("1", "Rust programming"), ("2", "Gardening")]);
        assert_eq!(ids(&index.search("progamming")), vec!["1"]);
    }

    #[test]
    fn test_all_tokens_must_match() {
        let index = index(&[("1", "Rust async book"), ("2", "Rust embedded")]);
        assert_eq!(ids(&index.search("rust async")), vec!["1"]);
        assert!(index.search("python").is_empty());
    }

    #[test]
    fn test_title_outweighs_url() {
        let items = vec![
            Item::with_id("url", "https://docs.rs/tokio").titled("Docs"),
            Item::with_id("title", "https://example.com").titled("tokio tutorial"),
        ];
        let mut index = WeightedIndex::default();
        index.set_collection(&items);
        assert_eq!(ids(&index.search("tokio")), vec!["title", "url"]);
    }

    #[test]
    fn test_empty_query_has_no_hits() {
        let index = index(&[("1", "Foobar")]);
        assert!(index.search("   ").is_empty());
        assert!(index.search("'").is_empty());
    }

    #[test]
    fn test_subsequence() {
        assert!(is_subsequence("rst", "rust"));
        assert!(!is_subsequence("tsr", "rust"));
    }
}
