//! Bookmark command handlers

use anyhow::{bail, Result};

use tabkeep_core::{Domain, Engine, Item};

use super::{item_ids, resolve_tag};
use crate::output::Output;

/// Save a new bookmark
pub fn add(
    engine: &Engine,
    url: String,
    title: Option<String>,
    tags: Vec<String>,
    output: &Output,
) -> Result<()> {
    if url.trim().is_empty() {
        bail!("URL cannot be empty");
    }

    let known = engine.tags();
    let tag_ids = tags
        .iter()
        .map(|t| resolve_tag(&known, t))
        .collect::<Result<Vec<_>>>()?;

    let mut item = Item::new(url.trim()).tagged(tag_ids);
    if let Some(title) = title {
        item = item.titled(title);
    }

    let id = engine.add_bookmark(item.clone())?;
    if output.is_json() {
        output.json(&item);
    } else if output.is_quiet() {
        println!("{}", id);
    } else {
        output.success(&format!("Saved bookmark {}", id));
    }
    Ok(())
}

/// Delete bookmarks by id
pub fn remove(engine: &mut Engine, ids: Vec<String>, output: &Output) -> Result<()> {
    let ids = item_ids(ids);
    let removed = engine.remove_items(Domain::Bookmarks, &ids);
    if removed == 0 {
        bail!("No matching bookmarks");
    }
    output.success(&format!("Deleted {} bookmark(s)", removed));
    Ok(())
}

/// Add a tag to bookmarks
pub fn tag(engine: &Engine, tag: String, ids: Vec<String>, output: &Output) -> Result<()> {
    let tag_id = resolve_tag(&engine.tags(), &tag)?;
    let changed = engine.tag_items(Domain::Bookmarks, &item_ids(ids), tag_id)?;
    output.success(&format!("Tagged {} bookmark(s)", changed));
    Ok(())
}

/// Remove a tag from bookmarks
pub fn untag(engine: &Engine, tag: String, ids: Vec<String>, output: &Output) -> Result<()> {
    let tag_id = resolve_tag(&engine.tags(), &tag)?;
    let changed = engine.untag_items(Domain::Bookmarks, &item_ids(ids), tag_id)?;
    output.success(&format!("Untagged {} bookmark(s)", changed));
    Ok(())
}
