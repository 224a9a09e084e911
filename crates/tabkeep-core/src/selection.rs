//! Selected items per domain
//!
//! Selection survives filter changes; ids hidden by a filter stay selected.
//! Ids leave the selection when their items leave the collection.

use std::collections::HashSet;

use crate::models::{Domain, ItemId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionTracker {
    ids: HashSet<ItemId>,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select exactly `visible` (usually the filtered view)
    pub fn select_all<'a>(&mut self, visible: impl IntoIterator<Item = &'a ItemId>) {
        self.ids = visible.into_iter().cloned().collect();
    }

    pub fn deselect_all(&mut self) {
        self.ids.clear();
    }

    /// Flip one id; returns whether it is now selected
    pub fn toggle(&mut self, id: &ItemId) -> bool {
        if self.ids.remove(id) {
            false
        } else {
            self.ids.insert(id.clone());
            true
        }
    }

    pub fn replace(&mut self, ids: impl IntoIterator<Item = ItemId>) {
        self.ids = ids.into_iter().collect();
    }

    /// Keep only ids for which `exists` holds; returns how many were dropped
    pub fn retain_existing(&mut self, exists: impl Fn(&ItemId) -> bool) -> usize {
        let before = self.ids.len();
        self.ids.retain(|id| exists(id));
        before - self.ids.len()
    }

    /// Forget removed ids; returns how many were selected
    pub fn prune<'a>(&mut self, removed: impl IntoIterator<Item = &'a ItemId>) -> usize {
        removed
            .into_iter()
            .filter(|id| self.ids.remove(*id))
            .count()
    }

    pub fn is_selected(&self, id: &ItemId) -> bool {
        self.ids.contains(id)
    }

    pub fn ids(&self) -> &HashSet<ItemId> {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Independent selections for tabs and bookmarks
#[derive(Debug, Clone, Default)]
pub struct Selections {
    tabs: SelectionTracker,
    bookmarks: SelectionTracker,
}

impl Selections {
    pub fn get(&self, domain: Domain) -> &SelectionTracker {
        match domain {
            Domain::Tabs => &self.tabs,
            Domain::Bookmarks => &self.bookmarks,
        }
    }

    pub fn get_mut(&mut self, domain: Domain) -> &mut SelectionTracker {
        match domain {
            Domain::Tabs => &mut self.tabs,
            Domain::Bookmarks => &mut self.bookmarks,
        }
    }
}
