//! Curate command handler

use std::collections::HashSet;

use anyhow::Result;

use tabkeep_core::{Engine, ItemId};

use super::item_ids;
use crate::output::Output;

/// Show the ranked curation queue
pub fn queue(engine: &Engine, pick: Vec<String>, output: &Output) -> Result<()> {
    let manual: HashSet<ItemId> = item_ids(pick).into_iter().collect();
    let queue = engine.curate_queue(&manual);
    output.print_queue(&queue, &engine.bookmarks().bookmarks, &engine.tags());
    Ok(())
}
