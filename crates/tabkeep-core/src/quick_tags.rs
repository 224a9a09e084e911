//! Quick tags
//!
//! A quick tag is created on the fly by "quick save" and named after the
//! moment it was made. It lives only as long as some item references it.

use std::collections::HashSet;

use chrono::{DateTime, Local, Utc};

use crate::models::{Item, TagId, TagsDoc};

/// Colour given to newly created quick tags
pub const QUICK_TAG_COLOR: &str = "#f59e0b";

/// Display name for a quick tag created at `at`
pub fn quick_tag_name(at: DateTime<Utc>) -> String {
    format!("Quick {}", at.with_timezone(&Local).format("%Y-%m-%d %H:%M"))
}

/// Quick tag ids referenced by at least one item
pub fn referenced_quick_tags(tags: &TagsDoc, collections: &[&[Item]]) -> HashSet<TagId> {
    let quick: HashSet<TagId> = tags
        .tags
        .iter()
        .filter(|t| t.is_quick)
        .map(|t| t.id)
        .collect();

    collections
        .iter()
        .flat_map(|items| items.iter())
        .flat_map(|item| item.tag_ids.iter().copied())
        .filter(|id| quick.contains(id))
        .collect()
}

/// Drop every quick tag no item references
///
/// Returns the new tag document, or `None` when nothing was collected.
pub fn collect_garbage(tags: &TagsDoc, collections: &[&[Item]]) -> Option<TagsDoc> {
    let live = referenced_quick_tags(tags, collections);
    let dead = tags
        .tags
        .iter()
        .filter(|t| t.is_quick && !live.contains(&t.id))
        .count();
    if dead == 0 {
        return None;
    }

    let mut next = tags.clone();
    next.tags.retain(|t| !t.is_quick || live.contains(&t.id));
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tag;

    fn tags_with_quick(ids: &[TagId]) -> TagsDoc {
        let mut doc = TagsDoc::default();
        doc.tags.push(Tag::new(1, "reading", "#fff"));
        for id in ids {
            let mut tag = Tag::new(*id, format!("Quick {}", id), QUICK_TAG_COLOR);
            tag.is_quick = true;
            doc.tags.push(tag);
        }
        doc
    }

    #[test]
    fn test_unreferenced_quick_tag_is_collected() {
        let tags = tags_with_quick(&[7]);
        let next = collect_garbage(&tags, &[&[], &[]]).unwrap();
        assert!(!next.contains(7));
        assert!(next.contains(1));
        assert!(next.contains(0));
    }

    #[test]
    fn test_reference_from_either_collection_keeps_tag() {
        let tags = tags_with_quick(&[7, 8]);
        let tabs = vec![Item::new("https://a.com").tagged([7])];
        let bookmarks = vec![Item::new("https://b.com").tagged([1, 8])];

        assert!(collect_garbage(&tags, &[tabs.as_slice(), bookmarks.as_slice()]).is_none());

        let next = collect_garbage(&tags, &[tabs.as_slice(), &[]]).unwrap();
        assert!(next.contains(7));
        assert!(!next.contains(8));
    }

    #[test]
    fn test_regular_tags_are_never_collected() {
        let tags = tags_with_quick(&[]);
        assert!(collect_garbage(&tags, &[&[]]).is_none());
    }

    #[test]
    fn test_quick_tag_name_format() {
        let name = quick_tag_name(Utc::now());
        assert!(name.starts_with("Quick "));
        assert_eq!(name.len(), "Quick 2026-01-01 00:00".len());
    }
}
