//! Ordering items inside groups and the groups themselves

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::group::{normalized_domain, Group, GroupKey};
use crate::models::{Item, ItemId, TagsDoc};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortProp {
    /// Keep collection order
    #[default]
    Index,
    Title,
    Url,
    Domain,
    SavedAt,
    LastAccessed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            SortDir::Asc => ord,
            SortDir::Desc => ord.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sort {
    pub prop: SortProp,
    pub dir: SortDir,
}

impl Sort {
    pub fn new(prop: SortProp, dir: SortDir) -> Self {
        Self { prop, dir }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupOrder {
    #[default]
    Key,
    Size,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupSort {
    pub by: GroupOrder,
    pub dir: SortDir,
}

/// Compare two items by `prop`, breaking ties by title then url
pub fn compare_items(a: &Item, b: &Item, sort: Sort) -> Ordering {
    let primary = match sort.prop {
        SortProp::Index => return Ordering::Equal,
        SortProp::Title => compare_text(&a.title, &b.title),
        SortProp::Url => compare_text(&a.url, &b.url),
        SortProp::Domain => normalized_domain(&a.url).cmp(&normalized_domain(&b.url)),
        SortProp::SavedAt => a.saved_at.cmp(&b.saved_at),
        SortProp::LastAccessed => a.last_accessed.cmp(&b.last_accessed),
    };
    sort.dir
        .apply(primary)
        .then_with(|| compare_text(&a.title, &b.title))
        .then_with(|| compare_text(&a.url, &b.url))
}

fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// Sort the ids of every group in place (stable)
pub fn sort_group_items(groups: &mut [Group], items: &[Item], sort: Sort) {
    if sort.prop == SortProp::Index {
        return;
    }
    let by_id: HashMap<&ItemId, &Item> = items.iter().map(|item| (&item.id, item)).collect();
    for group in groups.iter_mut() {
        group.item_ids.sort_by(|a, b| match (by_id.get(a), by_id.get(b)) {
            (Some(a), Some(b)) => compare_items(a, b, sort),
            _ => Ordering::Equal,
        });
    }
}

/// Order the groups themselves
///
/// Groups of favorite tags move to the front, then the rest follow the
/// configured key or size order. `Other` always comes last.
pub fn sort_groups(groups: &mut [Group], group_sort: GroupSort, tags: &TagsDoc) {
    groups.sort_by(|a, b| {
        let ord = match group_sort.by {
            GroupOrder::Key => compare_keys(&a.key, &b.key, tags),
            GroupOrder::Size => a.len().cmp(&b.len()),
        };
        group_sort.dir.apply(ord)
    });

    let is_favorite = |key: &GroupKey| match key {
        GroupKey::Tag(id) => tags.get(*id).is_some_and(|t| t.favorite),
        _ => false,
    };
    groups.sort_by_key(|g| (g.key.is_other(), !is_favorite(&g.key)));
}

fn compare_keys(a: &GroupKey, b: &GroupKey, tags: &TagsDoc) -> Ordering {
    match (a, b) {
        (GroupKey::Tag(x), GroupKey::Tag(y)) => {
            let name = |id| tags.get(id).map(|t| t.name.to_lowercase());
            name(*x).cmp(&name(*y)).then(x.cmp(y))
        }
        (GroupKey::Window(x), GroupKey::Window(y)) => x.cmp(y),
        (GroupKey::Domain(x), GroupKey::Domain(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tag;
    use chrono::{Duration, Utc};

    fn group(key: GroupKey, ids: &[&str]) -> Group {
        Group {
            key,
            item_ids: ids.iter().map(|id| ItemId::from(*id)).collect(),
        }
    }

    fn ids(raw: &[&str]) -> Vec<ItemId> {
        raw.iter().map(|id| ItemId::from(*id)).collect()
    }

    fn tags() -> TagsDoc {
        let mut doc = TagsDoc::default();
        doc.tags.push(Tag::new(1, "beta", "#111"));
        doc.tags.push(Tag::new(2, "alpha", "#222"));
        let mut fav = Tag::new(3, "zeta", "#333");
        fav.favorite = true;
        doc.tags.push(fav);
        doc
    }

    #[test]
    fn test_sort_items_by_title_then_stable() {
        let items = vec![
            Item::with_id("1", "https://b.com").titled("Banana"),
            Item::with_id("2", "https://a.com").titled("apple"),
            Item::with_id("3", "https://c.com").titled("Cherry"),
        ];
        let mut groups = vec![group(GroupKey::All, &["1", "2", "3"])];

        sort_group_items(&mut groups, &items, Sort::new(SortProp::Title, SortDir::Asc));
        assert_eq!(groups[0].item_ids, ids(&["2", "1", "3"]));

        sort_group_items(&mut groups, &items, Sort::new(SortProp::Title, SortDir::Desc));
        assert_eq!(groups[0].item_ids, ids(&["3", "1", "2"]));
    }

    #[test]
    fn test_sort_by_date_breaks_ties_by_title() {
        let now = Utc::now();
        let mut a = Item::with_id("a", "https://a.com").titled("Zed");
        a.saved_at = now;
        let mut b = Item::with_id("b", "https://b.com").titled("Alpha");
        b.saved_at = now;
        let mut c = Item::with_id("c", "https://c.com").titled("Mid");
        c.saved_at = now - Duration::days(1);
        let items = vec![a, b, c];

        let mut groups = vec![group(GroupKey::All, &["a", "b", "c"])];
        sort_group_items(&mut groups, &items, Sort::new(SortProp::SavedAt, SortDir::Desc));
        assert_eq!(groups[0].item_ids, ids(&["b", "a", "c"]));
    }

    #[test]
    fn test_index_sort_keeps_order() {
        let items = vec![
            Item::with_id("1", "https://b.com").titled("B"),
            Item::with_id("2", "https://a.com").titled("A"),
        ];
        let mut groups = vec![group(GroupKey::All, &["1", "2"])];
        sort_group_items(&mut groups, &items, Sort::default());
        assert_eq!(groups[0].item_ids, ids(&["1", "2"]));
    }

    #[test]
    fn test_favorite_groups_come_first() {
        let mut groups = vec![
            group(GroupKey::Tag(1), &["x"]),
            group(GroupKey::Tag(3), &["y"]),
            group(GroupKey::Tag(2), &["z"]),
        ];
        sort_groups(&mut groups, GroupSort::default(), &tags());
        let keys: Vec<_> = groups.iter().map(|g| g.key.clone()).collect();
        assert_eq!(
            keys,
            vec![GroupKey::Tag(3), GroupKey::Tag(2), GroupKey::Tag(1)]
        );
    }

    #[test]
    fn test_other_is_always_last() {
        let mut groups = vec![
            group(GroupKey::Other, &["1", "2", "3"]),
            group(GroupKey::Domain("b.com".into()), &["4", "5"]),
            group(GroupKey::Domain("a.com".into()), &["6", "7", "8", "9"]),
        ];
        let by_size_desc = GroupSort {
            by: GroupOrder::Size,
            dir: SortDir::Desc,
        };
        sort_groups(&mut groups, by_size_desc, &tags());
        let keys: Vec<_> = groups.iter().map(|g| g.key.clone()).collect();
        assert_eq!(
            keys,
            vec![
                GroupKey::Domain("a.com".into()),
                GroupKey::Domain("b.com".into()),
                GroupKey::Other
            ]
        );
    }
}
