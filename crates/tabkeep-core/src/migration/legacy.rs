//! Legacy storage layout and its transforms
//!
//! The legacy layout keyed tags and bookmarks by id inside one object per
//! store, used epoch milliseconds for timestamps, allowed items without
//! tags, called the fallback tag "Unassigned" and stored curation sessions
//! without ids.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::Migration;
use crate::curate::{CurateSettings, Period, TimeUnit};
use crate::models::{
    keys, normalize_tag_ids, BookmarksDoc, CurateDoc, CurateSession, Item, ItemId, TabsDoc, Tag,
    TagId, TagsDoc, UNTAGGED_TAG_COLOR, UNTAGGED_TAG_ID, UNTAGGED_TAG_NAME,
};

/// Legacy storage keys
pub mod legacy_keys {
    pub const TAGS: &str = "tag-store";
    pub const BOOKMARKS: &str = "bookmark-store";
    pub const TABS: &str = "tab-store";
    pub const CURATE: &str = "curate-store";
}

/// Legacy name of the fallback tag
const LEGACY_UNTAGGED_NAME: &str = "Unassigned";

/// All legacy mappings, in the order they run
pub fn default_migrations() -> Vec<Migration> {
    vec![
        Migration::new(legacy_keys::TAGS, keys::TAGS, migrate_tags),
        Migration::new(legacy_keys::BOOKMARKS, keys::BOOKMARKS, migrate_bookmarks),
        Migration::new(legacy_keys::TABS, keys::TABS, migrate_tabs),
        Migration::new(legacy_keys::CURATE, keys::CURATE, migrate_curate),
    ]
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LegacyId {
    Number(u64),
    Text(String),
}

impl From<LegacyId> for ItemId {
    fn from(id: LegacyId) -> Self {
        match id {
            LegacyId::Number(n) => ItemId::from(n),
            LegacyId::Text(s) => ItemId::from(s),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyTag {
    id: TagId,
    name: String,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    favorite: bool,
    #[serde(default)]
    is_quick: bool,
    #[serde(default, rename = "isAI")]
    is_ai: bool,
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(default)]
    updated_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct LegacyTagStore {
    #[serde(default)]
    tags: BTreeMap<String, LegacyTag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyItem {
    #[serde(default)]
    id: Option<LegacyId>,
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    tag_ids: Option<Vec<TagId>>,
    #[serde(default)]
    pinned: bool,
    #[serde(default)]
    window_id: Option<u64>,
    #[serde(default)]
    saved_at: Option<i64>,
    #[serde(default)]
    last_accessed: Option<i64>,
    #[serde(default)]
    last_curated_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct LegacyBookmarkStore {
    #[serde(default)]
    bookmarks: BTreeMap<String, LegacyItem>,
}

#[derive(Debug, Deserialize)]
struct LegacyTabStore {
    #[serde(default)]
    tabs: Vec<LegacyItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyCurateSettings {
    #[serde(default)]
    threshold_unit: Option<TimeUnit>,
    #[serde(default)]
    threshold_value: Option<u32>,
    #[serde(default)]
    reminder_unit: Option<TimeUnit>,
    #[serde(default)]
    reminder_value: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySession {
    #[serde(default)]
    started_at: Option<i64>,
    #[serde(default)]
    finished_at: Option<i64>,
    #[serde(default)]
    item_ids: Vec<LegacyId>,
    #[serde(default)]
    curated_ids: Vec<LegacyId>,
}

#[derive(Debug, Deserialize)]
struct LegacyCurateStore {
    #[serde(default)]
    settings: Option<LegacyCurateSettings>,
    #[serde(default)]
    sessions: Vec<LegacySession>,
}

fn millis(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

fn convert_item(item: LegacyItem, fallback_id: Option<&str>) -> Item {
    let id: ItemId = match (item.id, fallback_id) {
        (Some(id), _) => id.into(),
        (None, Some(key)) => ItemId::from(key),
        (None, None) => ItemId::generate(),
    };

    Item {
        title: item.title.unwrap_or_else(|| item.url.clone()),
        url: item.url,
        id,
        tag_ids: normalize_tag_ids(item.tag_ids.unwrap_or_else(|| vec![UNTAGGED_TAG_ID])),
        pinned: item.pinned,
        window_id: item.window_id,
        saved_at: millis(item.saved_at).unwrap_or_else(Utc::now),
        last_accessed: millis(item.last_accessed),
        last_curated_at: millis(item.last_curated_at),
    }
}

/// Keyed legacy tags → sorted tag list; renames the fallback tag
pub fn migrate_tags(legacy: Value) -> Result<Option<Value>> {
    let store: LegacyTagStore =
        serde_json::from_value(legacy).context("Unreadable legacy tag store")?;

    let mut tags: Vec<Tag> = store
        .tags
        .into_values()
        .map(|legacy| {
            let now = Utc::now();
            let name = if legacy.name == LEGACY_UNTAGGED_NAME {
                UNTAGGED_TAG_NAME.to_string()
            } else {
                legacy.name
            };
            let created_at = millis(legacy.created_at).unwrap_or(now);
            Tag {
                id: legacy.id,
                name,
                color: legacy
                    .color
                    .unwrap_or_else(|| UNTAGGED_TAG_COLOR.to_string()),
                favorite: legacy.favorite,
                is_quick: legacy.is_quick,
                is_ai: legacy.is_ai,
                created_at,
                updated_at: millis(legacy.updated_at).unwrap_or(created_at),
            }
        })
        .collect();
    tags.sort_by_key(|t| t.id);
    tags.dedup_by_key(|t| t.id);

    if !tags.iter().any(|t| t.id == UNTAGGED_TAG_ID) {
        tags.insert(0, Tag::untagged());
    }

    Ok(Some(serde_json::to_value(TagsDoc { tags })?))
}

/// Keyed legacy bookmarks → list ordered by save time
pub fn migrate_bookmarks(legacy: Value) -> Result<Option<Value>> {
    let store: LegacyBookmarkStore =
        serde_json::from_value(legacy).context("Unreadable legacy bookmark store")?;

    let mut bookmarks = store
        .bookmarks
        .into_iter()
        .map(|(key, item)| convert_item(item, Some(&key)))
        .collect::<Vec<_>>();
    bookmarks.sort_by_key(|b| b.saved_at);

    Ok(Some(serde_json::to_value(BookmarksDoc { bookmarks })?))
}

pub fn migrate_tabs(legacy: Value) -> Result<Option<Value>> {
    let store: LegacyTabStore =
        serde_json::from_value(legacy).context("Unreadable legacy tab store")?;

    let tabs = store
        .tabs
        .into_iter()
        .map(|item| convert_item(item, None))
        .collect();

    Ok(Some(serde_json::to_value(TabsDoc { tabs })?))
}

/// Legacy sessions had no ids; each gets a fresh one
pub fn migrate_curate(legacy: Value) -> Result<Option<Value>> {
    let store: LegacyCurateStore =
        serde_json::from_value(legacy).context("Unreadable legacy curate store")?;

    let mut settings = CurateSettings::default();
    if let Some(old) = store.settings {
        if let Some(value) = old.threshold_value {
            settings.threshold = Period::new(old.threshold_unit.unwrap_or(TimeUnit::Month), value);
        }
        if let Some(value) = old.reminder_value {
            settings.reminder = Period::new(old.reminder_unit.unwrap_or(TimeUnit::Month), value);
        }
    }

    let sessions = store
        .sessions
        .into_iter()
        .map(|session| CurateSession {
            id: Uuid::new_v4(),
            started_at: millis(session.started_at).unwrap_or_else(Utc::now),
            finished_at: millis(session.finished_at),
            item_ids: session.item_ids.into_iter().map(Into::into).collect(),
            curated_ids: session.curated_ids.into_iter().map(Into::into).collect(),
        })
        .collect();

    Ok(Some(serde_json::to_value(CurateDoc { settings, sessions })?))
}
