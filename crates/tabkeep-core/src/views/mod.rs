//! Derived views over item collections
//!
//! A view is computed in three stages:
//!
//! 1. **filter**: collection + [`Filter`] → visible ids
//! 2. **group**: visible ids + [`Grouping`] → buckets
//! 3. **sort**: buckets + [`Sort`] + [`GroupSort`] → ordered buckets
//!
//! Every stage is a pure function. [`ViewCache`] memoizes each stage on its
//! inputs, comparing collections by `Arc` identity and configuration by
//! value, so re-deriving an unchanged view is a handful of pointer checks.

pub mod filter;
pub mod group;
pub mod sort;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use filter::{build_query, default_visible_ids, filter_items, filter_items_with, Filter};
pub use group::{group_items, normalized_domain, Group, GroupKey, Grouping};
pub use sort::{
    compare_items, sort_group_items, sort_groups, GroupOrder, GroupSort, Sort, SortDir, SortProp,
};

use crate::models::{ItemCollection, ItemId, TagsDoc};
use crate::search::{SearchIndex, WeightedIndex};

/// Everything that shapes a view besides the data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewConfig {
    #[serde(default)]
    pub filter: Filter,
    #[serde(default)]
    pub sort: Sort,
    #[serde(default)]
    pub grouping: Grouping,
    #[serde(default)]
    pub group_sort: GroupSort,
}

/// A fully derived view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct View {
    pub groups: Vec<Group>,
}

impl View {
    /// Distinct ids in display order
    pub fn item_ids(&self) -> Vec<ItemId> {
        let mut seen = std::collections::HashSet::new();
        self.groups
            .iter()
            .flat_map(|g| g.item_ids.iter())
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect()
    }
}

/// How often each stage actually recomputed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub index: usize,
    pub filter: usize,
    pub group: usize,
    pub sort: usize,
}

/// Compares by allocation rather than by value
struct ArcKey<T>(Arc<T>);

impl<T> PartialEq for ArcKey<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Clone for ArcKey<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// Single-entry memo: keeps the last input and its output
struct Memo<K, V> {
    last: Option<(K, Arc<V>)>,
}

impl<K: PartialEq, V> Memo<K, V> {
    fn new() -> Self {
        Self { last: None }
    }

    /// Returns the cached output for `key`, computing it on a miss
    fn get_or_compute(&mut self, key: K, compute: impl FnOnce() -> V) -> (Arc<V>, bool) {
        if let Some((last_key, value)) = &self.last {
            if *last_key == key {
                return (Arc::clone(value), false);
            }
        }
        let value = Arc::new(compute());
        self.last = Some((key, Arc::clone(&value)));
        (value, true)
    }
}

/// Memoized view derivation for one collection type
pub struct ViewCache<D> {
    index: Memo<ArcKey<D>, WeightedIndex>,
    filtered: Memo<(ArcKey<D>, Filter), Vec<ItemId>>,
    grouped: Memo<(ArcKey<Vec<ItemId>>, Grouping), Vec<Group>>,
    sorted: Memo<(ArcKey<Vec<Group>>, ArcKey<TagsDoc>, Sort, GroupSort), View>,
    stats: CacheStats,
}

impl<D: ItemCollection> Default for ViewCache<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: ItemCollection> ViewCache<D> {
    pub fn new() -> Self {
        Self {
            index: Memo::new(),
            filtered: Memo::new(),
            grouped: Memo::new(),
            sorted: Memo::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Ids passing the filter, or every non-pinned id with no filter
    pub fn visible_ids(&mut self, collection: &Arc<D>, filter: &Filter) -> Arc<Vec<ItemId>> {
        let items_key = ArcKey(Arc::clone(collection));

        let (index, rebuilt) = self.index.get_or_compute(items_key.clone(), || {
            let mut index = WeightedIndex::default();
            index.set_collection(collection.items());
            index
        });
        if rebuilt {
            self.stats.index += 1;
        }

        let (ids, recomputed) = self
            .filtered
            .get_or_compute((items_key, filter.clone()), || {
                if filter.is_empty() {
                    default_visible_ids(collection.items())
                } else {
                    filter_items_with(collection.items(), filter, &*index)
                }
            });
        if recomputed {
            self.stats.filter += 1;
        }
        ids
    }

    /// Derive the view for `config`
    pub fn derive(
        &mut self,
        collection: &Arc<D>,
        tags: &Arc<TagsDoc>,
        config: &ViewConfig,
    ) -> Arc<View> {
        let ids = self.visible_ids(collection, &config.filter);

        let (groups, regrouped) = self
            .grouped
            .get_or_compute((ArcKey(Arc::clone(&ids)), config.grouping), || {
                group_items(collection.items(), &ids, config.grouping)
            });
        if regrouped {
            self.stats.group += 1;
        }

        let key = (
            ArcKey(Arc::clone(&groups)),
            ArcKey(Arc::clone(tags)),
            config.sort,
            config.group_sort,
        );
        let (view, resorted) = self.sorted.get_or_compute(key, || {
            let mut groups = (*groups).clone();
            sort_group_items(&mut groups, collection.items(), config.sort);
            sort_groups(&mut groups, config.group_sort, tags);
            View { groups }
        });
        if resorted {
            self.stats.sort += 1;
            debug!("Derived {} view with {} groups", D::DOMAIN, view.groups.len());
        }
        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookmarksDoc, Item, Tag, TabsDoc};

    fn bookmarks() -> Arc<BookmarksDoc> {
        Arc::new(BookmarksDoc {
            bookmarks: vec![
                Item::with_id("1", "https://docs.rs/serde").titled("serde docs").tagged([1]),
                Item::with_id("2", "https://docs.rs/tokio").titled("tokio docs").tagged([2]),
                Item::with_id("3", "https://blog.test/rust").titled("Rust blog").tagged([1, 2]),
            ],
        })
    }

    fn tags() -> Arc<TagsDoc> {
        let mut doc = TagsDoc::default();
        doc.tags.push(Tag::new(1, "serde", "#111"));
        doc.tags.push(Tag::new(2, "async", "#222"));
        Arc::new(doc)
    }

    #[test]
    fn test_unfiltered_view_shows_non_pinned() {
        let mut tabs = TabsDoc::default();
        tabs.tabs.push(Item::with_id("a", "https://a.com"));
        let mut pinned = Item::with_id("b", "https://b.com");
        pinned.pinned = true;
        tabs.tabs.push(pinned);
        let tabs = Arc::new(tabs);

        let mut cache = ViewCache::new();
        let view = cache.derive(&tabs, &tags(), &ViewConfig::default());
        assert_eq!(view.item_ids(), vec![ItemId::from("a")]);
    }

    #[test]
    fn test_unchanged_inputs_hit_cache() {
        let data = bookmarks();
        let tags = tags();
        let config = ViewConfig {
            grouping: Grouping::Tag,
            ..Default::default()
        };
        let mut cache = ViewCache::new();

        let first = cache.derive(&data, &tags, &config);
        let second = cache.derive(&data, &tags, &config);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            cache.stats(),
            CacheStats {
                index: 1,
                filter: 1,
                group: 1,
                sort: 1
            }
        );
    }

    #[test]
    fn test_sort_change_reuses_filter_and_groups() {
        let data = bookmarks();
        let tags = tags();
        let mut config = ViewConfig::default();
        let mut cache = ViewCache::new();
        cache.derive(&data, &tags, &config);

        config.sort = Sort::new(SortProp::Title, SortDir::Desc);
        let view = cache.derive(&data, &tags, &config);

        let stats = cache.stats();
        assert_eq!((stats.filter, stats.group, stats.sort), (1, 1, 2));
        assert_eq!(
            view.item_ids(),
            vec![ItemId::from("2"), ItemId::from("1"), ItemId::from("3")]
        );
    }

    #[test]
    fn test_new_collection_reference_recomputes() {
        let tags = tags();
        let config = ViewConfig::default();
        let mut cache = ViewCache::new();
        cache.derive(&bookmarks(), &tags, &config);
        cache.derive(&bookmarks(), &tags, &config);
        assert_eq!(cache.stats().filter, 2);
        assert_eq!(cache.stats().index, 2);
    }

    #[test]
    fn test_filtered_grouped_view() {
        let data = bookmarks();
        let config = ViewConfig {
            filter: Filter::keywords(["docs"]),
            grouping: Grouping::Tag,
            ..Default::default()
        };
        let mut cache = ViewCache::new();
        let view = cache.derive(&data, &tags(), &config);

        // "async" sorts before "serde" by name
        let keys: Vec<_> = view.groups.iter().map(|g| g.key.clone()).collect();
        assert_eq!(keys, vec![GroupKey::Tag(2), GroupKey::Tag(1)]);
        assert_eq!(view.item_ids(), vec![ItemId::from("2"), ItemId::from("1")]);
    }
}
