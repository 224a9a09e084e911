//! List command handler

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use tabkeep_core::views::{Filter, ViewCache, ViewConfig};
use tabkeep_core::{BookmarksDoc, Domain, Engine, TabsDoc};

use super::resolve_tag;
use crate::output::Output;
use crate::ListArgs;

/// List one collection through a derived view
pub fn list(engine: &Engine, args: &ListArgs, output: &Output) -> Result<()> {
    let tags = engine.tags();
    let tag_ids = args
        .tag
        .iter()
        .map(|t| resolve_tag(&tags, t))
        .collect::<Result<BTreeSet<_>>>()?;

    let config = ViewConfig {
        filter: Filter {
            keywords: args.keyword.clone(),
            tag_ids,
            loose_match: args.loose,
        },
        sort: args.sort(),
        grouping: args.group.into(),
        group_sort: args.group_sort(),
    };

    match Domain::from(args.domain) {
        Domain::Tabs => {
            let tabs: Arc<TabsDoc> = engine.tabs();
            let mut cache = ViewCache::new();
            let view = cache.derive(&tabs, &tags, &config);
            debug!(stats = ?cache.stats(), "derived tab view");
            output.print_view(&view, &tabs.tabs, &tags);
        }
        Domain::Bookmarks => {
            let bookmarks: Arc<BookmarksDoc> = engine.bookmarks();
            let mut cache = ViewCache::new();
            let view = cache.derive(&bookmarks, &tags, &config);
            debug!(stats = ?cache.stats(), "derived bookmark view");
            output.print_view(&view, &bookmarks.bookmarks, &tags);
        }
    }

    Ok(())
}
