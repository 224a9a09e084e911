//! Tag command handlers

use std::collections::HashMap;

use anyhow::Result;

use tabkeep_core::{Engine, TagId};

use super::resolve_tag;
use crate::output::Output;

/// List all tags with usage counts across tabs and bookmarks
pub fn list(engine: &Engine, output: &Output) -> Result<()> {
    let tabs = engine.tabs();
    let bookmarks = engine.bookmarks();
    let mut counts: HashMap<TagId, usize> = HashMap::new();
    for item in tabs.tabs.iter().chain(bookmarks.bookmarks.iter()) {
        for id in &item.tag_ids {
            *counts.entry(*id).or_default() += 1;
        }
    }

    let tags: Vec<_> = engine
        .tags()
        .tags
        .iter()
        .map(|tag| (tag.clone(), counts.get(&tag.id).copied().unwrap_or(0)))
        .collect();
    output.print_tags(&tags);
    Ok(())
}

/// Create a tag
pub fn create(engine: &Engine, name: String, color: String, output: &Output) -> Result<()> {
    let tag = engine.create_tag(&name, &color)?;
    if output.is_json() {
        output.json(&tag);
    } else if output.is_quiet() {
        println!("{}", tag.id);
    } else {
        output.success(&format!("Created tag {} ({})", tag.name, tag.id));
    }
    Ok(())
}

/// Toggle a tag's favorite flag
pub fn favorite(engine: &Engine, tag: String, output: &Output) -> Result<()> {
    let id = resolve_tag(&engine.tags(), &tag)?;
    let favorite = engine.toggle_favorite(id)?;
    let state = if favorite { "now" } else { "no longer" };
    output.success(&format!("Tag {} is {} a favorite", id, state));
    Ok(())
}

/// Delete a tag; its items fall back to Untagged
pub fn delete(engine: &Engine, tag: String, output: &Output) -> Result<()> {
    let id = resolve_tag(&engine.tags(), &tag)?;
    engine.delete_tag(id)?;
    output.success(&format!("Deleted tag {}", id));
    Ok(())
}
