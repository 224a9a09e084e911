//! Command handlers

pub mod bookmark;
pub mod config;
pub mod curate;
pub mod list;
pub mod migrate;
pub mod status;
pub mod tag;

use anyhow::{bail, Result};

use tabkeep_core::{ItemId, TagId, TagsDoc};

/// Resolve a tag given by numeric id or by name (case-insensitive)
pub fn resolve_tag(tags: &TagsDoc, arg: &str) -> Result<TagId> {
    let arg = arg.trim();
    if let Ok(id) = arg.parse::<TagId>() {
        if tags.contains(id) {
            return Ok(id);
        }
        bail!("Tag {} does not exist", id);
    }

    let matches: Vec<TagId> = tags
        .tags
        .iter()
        .filter(|t| t.name.eq_ignore_ascii_case(arg))
        .map(|t| t.id)
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => bail!("No tag named '{}'", arg),
        _ => bail!("Tag name '{}' is ambiguous, use the id", arg),
    }
}

pub fn item_ids(raw: Vec<String>) -> Vec<ItemId> {
    raw.into_iter().map(ItemId::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabkeep_core::Tag;

    fn tags() -> TagsDoc {
        let mut doc = TagsDoc::default();
        doc.tags.push(Tag::new(1, "Rust", "#dea584"));
        doc.tags.push(Tag::new(2, "reading", "#3b82f6"));
        doc.tags.push(Tag::new(3, "READING", "#3b82f6"));
        doc
    }

    #[test]
    fn test_resolve_by_id_and_name() {
        assert_eq!(resolve_tag(&tags(), "1").unwrap(), 1);
        assert_eq!(resolve_tag(&tags(), "rust").unwrap(), 1);
        assert_eq!(resolve_tag(&tags(), "untagged").unwrap(), 0);
    }

    #[test]
    fn test_resolve_errors() {
        assert!(resolve_tag(&tags(), "42").is_err());
        assert!(resolve_tag(&tags(), "missing").is_err());
        // Two tags differ only by case
        assert!(resolve_tag(&tags(), "reading").is_err());
    }
}
