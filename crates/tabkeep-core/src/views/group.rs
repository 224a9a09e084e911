//! Grouping filtered items into buckets

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::models::{Item, ItemId, TagId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grouping {
    #[default]
    None,
    Tag,
    Window,
    Domain,
}

/// Key identifying one bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum GroupKey {
    /// Single bucket when grouping is off
    All,
    Tag(TagId),
    Window(u64),
    Domain(String),
    /// Synthetic bucket for leftovers
    Other,
}

impl GroupKey {
    pub fn is_other(&self) -> bool {
        matches!(self, GroupKey::Other)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub key: GroupKey,
    pub item_ids: Vec<ItemId>,
}

impl Group {
    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }
}

/// Lowercased host without a leading `www.`
pub fn normalized_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Bucket the items named by `ids`
///
/// Groups come out in first-seen order and items inside a group keep the
/// source collection order. Ordering buckets is left to the sort stage.
pub fn group_items(items: &[Item], ids: &[ItemId], grouping: Grouping) -> Vec<Group> {
    let by_id: HashMap<&ItemId, &Item> = items.iter().map(|item| (&item.id, item)).collect();
    let mut selected: Vec<&Item> = ids.iter().filter_map(|id| by_id.get(id).copied()).collect();
    // Keep source order regardless of the order ids were produced in
    let position: HashMap<&ItemId, usize> =
        items.iter().enumerate().map(|(i, item)| (&item.id, i)).collect();
    selected.sort_by_key(|item| position.get(&item.id).copied().unwrap_or(usize::MAX));

    let mut groups: Vec<Group> = Vec::new();
    let mut slots: HashMap<GroupKey, usize> = HashMap::new();
    let mut push = |key: GroupKey, id: &ItemId| {
        let slot = *slots.entry(key.clone()).or_insert_with(|| {
            groups.push(Group {
                key,
                item_ids: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].item_ids.push(id.clone());
    };

    for item in &selected {
        match grouping {
            Grouping::None => push(GroupKey::All, &item.id),
            Grouping::Tag => {
                for tag_id in &item.tag_ids {
                    push(GroupKey::Tag(*tag_id), &item.id);
                }
            }
            Grouping::Window => match item.window_id {
                Some(window) => push(GroupKey::Window(window), &item.id),
                None => push(GroupKey::Other, &item.id),
            },
            Grouping::Domain => match normalized_domain(&item.url) {
                Some(domain) => push(GroupKey::Domain(domain), &item.id),
                None => push(GroupKey::Other, &item.id),
            },
        }
    }

    if grouping == Grouping::Domain {
        merge_singletons(groups, &position)
    } else {
        groups
    }
}

/// Fold single-item domain buckets into `Other`, in source order
fn merge_singletons(groups: Vec<Group>, position: &HashMap<&ItemId, usize>) -> Vec<Group> {
    let mut kept = Vec::with_capacity(groups.len());
    let mut other: Vec<ItemId> = Vec::new();
    for group in groups {
        if group.key.is_other() || group.len() == 1 {
            other.extend(group.item_ids);
        } else {
            kept.push(group);
        }
    }
    if !other.is_empty() {
        other.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
        kept.push(Group {
            key: GroupKey::Other,
            item_ids: other,
        });
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_ids(items: &[Item]) -> Vec<ItemId> {
        items.iter().map(|i| i.id.clone()).collect()
    }

    fn keys(groups: &[Group]) -> Vec<GroupKey> {
        groups.iter().map(|g| g.key.clone()).collect()
    }

    #[test]
    fn test_normalized_domain() {
        assert_eq!(
            normalized_domain("https://WWW.Example.com/path"),
            Some("example.com".to_string())
        );
        assert_eq!(normalized_domain("about:blank"), None);
        assert_eq!(normalized_domain("not a url"), None);
    }

    #[test]
    fn test_no_grouping_is_one_bucket() {
        let items = vec![Item::with_id("1", "https://a.com"), Item::with_id("2", "https://b.com")];
        let groups = group_items(&items, &all_ids(&items), Grouping::None);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, GroupKey::All);
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn test_item_with_many_tags_appears_in_each_group() {
        let items = vec![
            Item::with_id("1", "https://a.com").tagged([1, 2]),
            Item::with_id("2", "https://b.com").tagged([2]),
        ];
        let groups = group_items(&items, &all_ids(&items), Grouping::Tag);
        assert_eq!(keys(&groups), vec![GroupKey::Tag(1), GroupKey::Tag(2)]);
        assert_eq!(groups[1].item_ids, vec![ItemId::from("1"), ItemId::from("2")]);
    }

    #[test]
    fn test_group_keeps_source_order() {
        let items = vec![
            Item::with_id("a", "https://a.com").tagged([1]),
            Item::with_id("b", "https://b.com").tagged([1]),
        ];
        let reversed = vec![ItemId::from("b"), ItemId::from("a")];
        let groups = group_items(&items, &reversed, Grouping::Tag);
        assert_eq!(groups[0].item_ids, vec![ItemId::from("a"), ItemId::from("b")]);
    }

    #[test]
    fn test_singleton_domains_merge_into_other() {
        let items = vec![
            Item::with_id("1", "https://docs.rs/a"),
            Item::with_id("2", "https://www.docs.rs/b"),
            Item::with_id("3", "https://lonely.org"),
            Item::with_id("4", "about:blank"),
        ];
        let groups = group_items(&items, &all_ids(&items), Grouping::Domain);
        assert_eq!(
            keys(&groups),
            vec![GroupKey::Domain("docs.rs".to_string()), GroupKey::Other]
        );
        assert_eq!(groups[1].item_ids, vec![ItemId::from("3"), ItemId::from("4")]);
    }

    #[test]
    fn test_other_bucket_keeps_source_order() {
        let items = vec![
            Item::with_id("1", "about:blank"),
            Item::with_id("2", "https://x.org"),
            Item::with_id("3", "https://y.com"),
            Item::with_id("4", "about:blank"),
        ];
        let groups = group_items(&items, &all_ids(&items), Grouping::Domain);
        assert_eq!(keys(&groups), vec![GroupKey::Other]);
        assert_eq!(
            groups[0].item_ids,
            vec![
                ItemId::from("1"),
                ItemId::from("2"),
                ItemId::from("3"),
                ItemId::from("4")
            ]
        );
    }

    #[test]
    fn test_window_grouping() {
        let mut a = Item::with_id("1", "https://a.com");
        a.window_id = Some(2);
        let mut b = Item::with_id("2", "https://b.com");
        b.window_id = Some(1);
        let c = Item::with_id("3", "https://c.com");
        let items = vec![a, b, c];

        let groups = group_items(&items, &all_ids(&items), Grouping::Window);
        assert_eq!(
            keys(&groups),
            vec![GroupKey::Window(2), GroupKey::Window(1), GroupKey::Other]
        );
    }
}
