//! Filtering items by keywords and tags

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{Item, ItemId, TagId};
use crate::search::{SearchIndex, WeightedIndex};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub tag_ids: BTreeSet<TagId>,
    /// Search without exact-token anchoring
    #[serde(default)]
    pub loose_match: bool,
}

impl Filter {
    pub fn keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn tags(tag_ids: impl IntoIterator<Item = TagId>) -> Self {
        Self {
            tag_ids: tag_ids.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn loose(mut self, loose_match: bool) -> Self {
        self.loose_match = loose_match;
        self
    }

    /// No keywords and no tags
    pub fn is_empty(&self) -> bool {
        self.keywords.iter().all(|k| k.trim().is_empty()) && self.tag_ids.is_empty()
    }
}

/// Search query for the filter's keywords, `None` without keywords
///
/// Strict filters anchor every token with `'`.
pub fn build_query(filter: &Filter) -> Option<String> {
    let tokens: Vec<String> = filter
        .keywords
        .iter()
        .flat_map(|k| k.split_whitespace())
        .map(|token| {
            if filter.loose_match {
                token.to_string()
            } else {
                format!("'{}", token)
            }
        })
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

/// Ids of items matching `filter`, in collection order
///
/// An empty filter matches nothing; see [`default_visible_ids`] for the
/// unfiltered view.
pub fn filter_items(items: &[Item], filter: &Filter) -> Vec<ItemId> {
    let mut index = WeightedIndex::default();
    index.set_collection(items);
    filter_items_with(items, filter, &index)
}

/// Same as [`filter_items`] against a prepared index
pub fn filter_items_with(items: &[Item], filter: &Filter, index: &dyn SearchIndex) -> Vec<ItemId> {
    if filter.is_empty() {
        return Vec::new();
    }

    let fuzzy: Option<HashSet<ItemId>> = build_query(filter).map(|query| {
        index
            .search(&query)
            .into_iter()
            .map(|hit| hit.id)
            .collect()
    });

    items
        .iter()
        .filter(|item| fuzzy.as_ref().map_or(true, |ids| ids.contains(&item.id)))
        .filter(|item| {
            filter.tag_ids.is_empty() || item.tag_ids.iter().any(|t| filter.tag_ids.contains(t))
        })
        .map(|item| item.id.clone())
        .collect()
}

/// Every non-pinned item, the view shown when no filter is active
pub fn default_visible_ids(items: &[Item]) -> Vec<ItemId> {
    items
        .iter()
        .filter(|item| !item.pinned)
        .map(|item| item.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<Item> {
        vec![
            Item::with_id("1", "https://one.test").titled("Foobar").tagged([1]),
            Item::with_id("2", "https://two.test").titled("afoo").tagged([2]),
            Item::with_id("3", "https://three.test").titled("Unrelated").tagged([1, 2]),
        ]
    }

    #[test]
    fn test_empty_filter_matches_nothing() {
        assert!(filter_items(&items(), &Filter::default()).is_empty());
        assert!(filter_items(&items(), &Filter::keywords(["  "])).is_empty());
    }

    #[test]
    fn test_strict_and_loose_keywords() {
        let strict = Filter::keywords(["foo"]);
        assert_eq!(filter_items(&items(), &strict), vec![ItemId::from("1")]);

        let loose = strict.loose(true);
        assert_eq!(
            filter_items(&items(), &loose),
            vec![ItemId::from("1"), ItemId::from("2")]
        );
    }

    #[test]
    fn test_tags_only_filter() {
        let filter = Filter::tags([2]);
        assert_eq!(
            filter_items(&items(), &filter),
            vec![ItemId::from("2"), ItemId::from("3")]
        );
    }

    #[test]
    fn test_keywords_and_tags_intersect() {
        let mut filter = Filter::keywords(["foo"]).loose(true);
        filter.tag_ids.insert(2);
        assert_eq!(filter_items(&items(), &filter), vec![ItemId::from("2")]);
    }

    #[test]
    fn test_build_query() {
        assert_eq!(
            build_query(&Filter::keywords(["rust book", "async"])),
            Some("'rust 'book 'async".to_string())
        );
        assert_eq!(
            build_query(&Filter::keywords(["rust"]).loose(true)),
            Some("rust".to_string())
        );
        assert_eq!(build_query(&Filter::tags([1])), None);
    }

    #[test]
    fn test_default_visible_skips_pinned() {
        let mut items = items();
        items[0].pinned = true;
        assert_eq!(
            default_visible_ids(&items),
            vec![ItemId::from("2"), ItemId::from("3")]
        );
    }
}
