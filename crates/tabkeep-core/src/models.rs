//! Data models for tabkeep
//!
//! Defines the core data structures: items (open tabs and bookmarks), tags,
//! curation sessions, and the per-key documents that hold them.
//!
//! Every item carries at least one tag id. When the last real tag is removed
//! the sentinel "Untagged" tag (id 0) takes its place.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Numeric tag identifier
pub type TagId = u32;

/// Id of the sentinel tag every untagged item falls back to
pub const UNTAGGED_TAG_ID: TagId = 0;

/// Name of the sentinel tag
pub const UNTAGGED_TAG_NAME: &str = "Untagged";

/// Color of the sentinel tag
pub const UNTAGGED_TAG_COLOR: &str = "#000000";

/// Identifier of an item (browser tab id or bookmark id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u64> for ItemId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

/// Which collection an item lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Tabs,
    Bookmarks,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Tabs => write!(f, "tabs"),
            Domain::Bookmarks => write!(f, "bookmarks"),
        }
    }
}

/// An open tab or a saved bookmark
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub url: String,
    pub title: String,
    /// Ordered, duplicate-free, never empty
    pub tag_ids: Vec<TagId>,
    #[serde(default)]
    pub pinned: bool,
    /// Browser window holding the tab (tabs only)
    #[serde(default)]
    pub window_id: Option<u64>,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub last_accessed: Option<DateTime<Utc>>,
    /// Last time this item went through a curation session
    #[serde(default)]
    pub last_curated_at: Option<DateTime<Utc>>,
}

impl Item {
    /// Create a new item with a random id, tagged with the sentinel tag
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_id(ItemId::generate(), url)
    }

    /// Create an item with a specific id
    pub fn with_id(id: impl Into<ItemId>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: id.into(),
            title: url.clone(),
            url,
            tag_ids: vec![UNTAGGED_TAG_ID],
            pinned: false,
            window_id: None,
            saved_at: Utc::now(),
            last_accessed: None,
            last_curated_at: None,
        }
    }

    /// Builder-style title setter
    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Builder-style tag setter
    pub fn tagged(mut self, tag_ids: impl IntoIterator<Item = TagId>) -> Self {
        self.set_tags(tag_ids);
        self
    }

    pub fn has_tag(&self, tag_id: TagId) -> bool {
        self.tag_ids.contains(&tag_id)
    }

    /// Add a tag; returns whether the tag set changed
    pub fn add_tag(&mut self, tag_id: TagId) -> bool {
        if self.has_tag(tag_id) {
            return false;
        }
        let mut tags = self.tag_ids.clone();
        tags.push(tag_id);
        self.set_tags(tags)
    }

    /// Remove a tag; returns whether the tag set changed
    pub fn remove_tag(&mut self, tag_id: TagId) -> bool {
        if !self.has_tag(tag_id) {
            return false;
        }
        let tags: Vec<TagId> = self
            .tag_ids
            .iter()
            .copied()
            .filter(|t| *t != tag_id)
            .collect();
        self.set_tags(tags)
    }

    /// Replace all tags; returns whether the tag set changed
    pub fn set_tags(&mut self, tag_ids: impl IntoIterator<Item = TagId>) -> bool {
        let normalized = normalize_tag_ids(tag_ids);
        if normalized == self.tag_ids {
            return false;
        }
        self.tag_ids = normalized;
        true
    }
}

/// Deduplicate tag ids preserving first occurrence.
///
/// The sentinel is dropped when a real tag is present and is the only entry
/// when none is.
pub fn normalize_tag_ids(tag_ids: impl IntoIterator<Item = TagId>) -> Vec<TagId> {
    let mut out: Vec<TagId> = Vec::new();
    for id in tag_ids {
        if id != UNTAGGED_TAG_ID && !out.contains(&id) {
            out.push(id);
        }
    }
    if out.is_empty() {
        out.push(UNTAGGED_TAG_ID);
    }
    out
}

/// A tag for organizing items
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub favorite: bool,
    /// Ephemeral tag created by quick save, deleted once unreferenced
    #[serde(default)]
    pub is_quick: bool,
    /// Tag suggested by an automatic classifier
    #[serde(default, rename = "isAI")]
    pub is_ai: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tag {
    pub fn new(id: TagId, name: impl Into<String>, color: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            color: color.into(),
            favorite: false,
            is_quick: false,
            is_ai: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// The sentinel tag
    pub fn untagged() -> Self {
        Self::new(UNTAGGED_TAG_ID, UNTAGGED_TAG_NAME, UNTAGGED_TAG_COLOR)
    }

    pub fn is_sentinel(&self) -> bool {
        self.id == UNTAGGED_TAG_ID
    }
}

/// One pass through the curation queue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurateSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Ranked queue captured when the session started
    pub item_ids: Vec<ItemId>,
    /// Items already handled in this session
    #[serde(default)]
    pub curated_ids: Vec<ItemId>,
}

impl CurateSession {
    pub fn new(item_ids: Vec<ItemId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            item_ids,
            curated_ids: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.finished_at.is_none()
    }

    /// Queue entries not yet curated, in queue order
    pub fn remaining(&self) -> impl Iterator<Item = &ItemId> {
        self.item_ids
            .iter()
            .filter(|id| !self.curated_ids.contains(id))
    }
}

/// An item closed through the engine, kept for restore
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClosedItem {
    pub item: Item,
    pub closed_at: DateTime<Utc>,
}

// ==================== Documents ====================
//
// One document per storage key. Collections are replaced wholesale on every
// mutation, so these are plain values.

/// Storage keys of the current layout
pub mod keys {
    pub const TABS: &str = "tabs";
    pub const BOOKMARKS: &str = "bookmarks";
    pub const TAGS: &str = "tags";
    pub const CURATE: &str = "curate";
    pub const RECENTLY_CLOSED: &str = "recently-closed";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TabsDoc {
    #[serde(default)]
    pub tabs: Vec<Item>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BookmarksDoc {
    #[serde(default)]
    pub bookmarks: Vec<Item>,
}

/// A document holding one item collection
pub trait ItemCollection {
    const DOMAIN: Domain;

    fn items(&self) -> &[Item];

    fn items_mut(&mut self) -> &mut Vec<Item>;

    fn get(&self, id: &ItemId) -> Option<&Item> {
        self.items().iter().find(|item| &item.id == id)
    }
}

impl ItemCollection for TabsDoc {
    const DOMAIN: Domain = Domain::Tabs;

    fn items(&self) -> &[Item] {
        &self.tabs
    }

    fn items_mut(&mut self) -> &mut Vec<Item> {
        &mut self.tabs
    }
}

impl ItemCollection for BookmarksDoc {
    const DOMAIN: Domain = Domain::Bookmarks;

    fn items(&self) -> &[Item] {
        &self.bookmarks
    }

    fn items_mut(&mut self) -> &mut Vec<Item> {
        &mut self.bookmarks
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagsDoc {
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Default for TagsDoc {
    fn default() -> Self {
        Self {
            tags: vec![Tag::untagged()],
        }
    }
}

impl TagsDoc {
    pub fn get(&self, id: TagId) -> Option<&Tag> {
        self.tags.iter().find(|t| t.id == id)
    }

    pub fn contains(&self, id: TagId) -> bool {
        self.get(id).is_some()
    }

    /// Next unused tag id
    pub fn next_id(&self) -> TagId {
        self.tags.iter().map(|t| t.id).max().map_or(1, |max| max + 1)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurateDoc {
    #[serde(default)]
    pub settings: crate::curate::CurateSettings,
    #[serde(default)]
    pub sessions: Vec<CurateSession>,
}

impl CurateDoc {
    pub fn active_session(&self) -> Option<&CurateSession> {
        self.sessions.iter().rev().find(|s| s.is_active())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecentlyClosedDoc {
    /// Most recent first
    #[serde(default)]
    pub items: Vec<ClosedItem>,
}
