//! The engine
//!
//! `Engine` owns one [`DocumentStore`] per storage key plus the per-domain
//! selections. All mutations go through it so that tag invariants, quick-tag
//! garbage collection and selection pruning happen in one place.
//!
//! ```ignore
//! let storage = Arc::new(SqliteStorage::open(&config.sqlite_path())?);
//! let mut engine = Engine::init(storage, config).await;
//! engine.tag_items(Domain::Bookmarks, &ids, tag.id)?;
//! engine.dispose().await;
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::curate::{self, CurateSettings, InclusionResult};
use crate::migration::MigrationRunner;
use crate::models::{
    keys, normalize_tag_ids, BookmarksDoc, ClosedItem, CurateDoc, CurateSession, Domain, Item,
    ItemCollection, ItemId, RecentlyClosedDoc, Tag, TagId, TabsDoc, TagsDoc, UNTAGGED_TAG_ID,
};
use crate::persistence::{DocumentData, InstanceId, PersistenceGateway};
use crate::quick_tags::{self, QUICK_TAG_COLOR};
use crate::selection::{SelectionTracker, Selections};
use crate::storage::StorageMedium;
use crate::store::DocumentStore;

/// Errors from engine operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Tag {0} does not exist")]
    UnknownTag(TagId),

    #[error("Item '{id}' not found in {domain}")]
    UnknownItem { id: ItemId, domain: Domain },

    #[error("The Untagged tag cannot be renamed or deleted")]
    SentinelTag,

    #[error("Tag name cannot be empty")]
    EmptyTagName,

    #[error("No curation session is active")]
    NoActiveSession,
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Browser-side tab operations the engine delegates to
#[async_trait]
pub trait TabsBridge: Send + Sync {
    async fn close_tab(&self, id: &ItemId) -> anyhow::Result<()>;
}

/// Outcome of a bulk browser operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub succeeded: Vec<ItemId>,
    pub failed: usize,
}

pub struct Engine {
    instance_id: InstanceId,
    config: Config,
    tabs: DocumentStore<TabsDoc>,
    bookmarks: DocumentStore<BookmarksDoc>,
    tags: Arc<DocumentStore<TagsDoc>>,
    curate: DocumentStore<CurateDoc>,
    recently_closed: DocumentStore<RecentlyClosedDoc>,
    selections: Selections,
}

impl Engine {
    /// Migrate legacy data, then hydrate every store
    ///
    /// Tags load first so that item tag references can be repaired against
    /// them. Must be called from within a tokio runtime.
    pub async fn init(storage: Arc<dyn StorageMedium>, config: Config) -> Self {
        let instance_id = InstanceId::generate();
        debug!("Starting engine instance {}", instance_id);

        let runner = MigrationRunner::with_defaults(Arc::clone(&storage), instance_id.clone());
        match runner.run().await {
            Ok(true) => info!("Migrated legacy data"),
            Ok(false) => {}
            Err(e) => warn!("Legacy migration failed, continuing with current data: {:#}", e),
        }

        let debounce = config.debounce();
        let open = |key: &str| {
            (
                Arc::clone(&storage),
                key.to_string(),
                instance_id.clone(),
                debounce,
            )
        };

        let mut tags: DocumentStore<TagsDoc> = open_store(open(keys::TAGS));
        tags.init(ensure_sentinel).await;
        let tags = Arc::new(tags);
        let known = tags.snapshot();

        let mut tabs: DocumentStore<TabsDoc> = open_store(open(keys::TABS));
        let mut bookmarks: DocumentStore<BookmarksDoc> = open_store(open(keys::BOOKMARKS));
        tabs.on_remote(reconcile_remote::<TabsDoc, _>(
            Arc::clone(&tags),
            bookmarks.subscribe(),
        ));
        bookmarks.on_remote(reconcile_remote::<BookmarksDoc, _>(
            Arc::clone(&tags),
            tabs.subscribe(),
        ));

        tabs.init(|doc| repair_tag_refs(&mut doc.tabs, &known)).await;
        bookmarks
            .init(|doc| repair_tag_refs(&mut doc.bookmarks, &known))
            .await;

        let mut curate: DocumentStore<CurateDoc> = open_store(open(keys::CURATE));
        curate.init(|_| false).await;

        let limit = config.recently_closed_limit;
        let mut recently_closed: DocumentStore<RecentlyClosedDoc> =
            open_store(open(keys::RECENTLY_CLOSED));
        recently_closed
            .init(|doc| {
                let over = doc.items.len() > limit;
                doc.items.truncate(limit);
                over
            })
            .await;

        Self {
            instance_id,
            config,
            tabs,
            bookmarks,
            tags,
            curate,
            recently_closed,
            selections: Selections::default(),
        }
    }

    /// Flush every pending write and shut down
    pub async fn dispose(self) {
        self.flush().await;
        debug!("Engine instance {} disposed", self.instance_id);
    }

    /// Wait for every pending write
    pub async fn flush(&self) {
        self.tags.flush().await;
        self.tabs.flush().await;
        self.bookmarks.flush().await;
        self.curate.flush().await;
        self.recently_closed.flush().await;
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ==================== Snapshots ====================

    pub fn tabs(&self) -> Arc<TabsDoc> {
        self.tabs.snapshot()
    }

    pub fn bookmarks(&self) -> Arc<BookmarksDoc> {
        self.bookmarks.snapshot()
    }

    pub fn tags(&self) -> Arc<TagsDoc> {
        self.tags.snapshot()
    }

    pub fn curate(&self) -> Arc<CurateDoc> {
        self.curate.snapshot()
    }

    pub fn recently_closed(&self) -> Arc<RecentlyClosedDoc> {
        self.recently_closed.snapshot()
    }

    pub fn subscribe_tabs(&self) -> watch::Receiver<Arc<TabsDoc>> {
        self.tabs.subscribe()
    }

    pub fn subscribe_bookmarks(&self) -> watch::Receiver<Arc<BookmarksDoc>> {
        self.bookmarks.subscribe()
    }

    pub fn subscribe_tags(&self) -> watch::Receiver<Arc<TagsDoc>> {
        self.tags.subscribe()
    }

    /// Clone of the items of one domain
    pub fn items(&self, domain: Domain) -> Vec<Item> {
        match domain {
            Domain::Tabs => self.tabs.snapshot().tabs.clone(),
            Domain::Bookmarks => self.bookmarks.snapshot().bookmarks.clone(),
        }
    }

    pub fn find_item(&self, domain: Domain, id: &ItemId) -> Option<Item> {
        match domain {
            Domain::Tabs => self.tabs.snapshot().get(id).cloned(),
            Domain::Bookmarks => self.bookmarks.snapshot().get(id).cloned(),
        }
    }

    // ==================== Selection ====================

    /// Selected ids of `domain` that still exist
    ///
    /// Items removed by another instance drop out here even before the
    /// stored selection is pruned.
    pub fn selection(&self, domain: Domain) -> SelectionTracker {
        let mut selection = self.selections.get(domain).clone();
        let live = self.live_ids(domain);
        selection.retain_existing(|id| live.contains(id));
        selection
    }

    /// Mutable selection, pruned to ids that still exist
    pub fn selection_mut(&mut self, domain: Domain) -> &mut SelectionTracker {
        let live = self.live_ids(domain);
        let selection = self.selections.get_mut(domain);
        let dropped = selection.retain_existing(|id| live.contains(id));
        if dropped > 0 {
            debug!("Pruned {} vanished {} from the selection", dropped, domain);
        }
        selection
    }

    fn live_ids(&self, domain: Domain) -> HashSet<ItemId> {
        match domain {
            Domain::Tabs => ids_of(self.tabs.snapshot().items()),
            Domain::Bookmarks => ids_of(self.bookmarks.snapshot().items()),
        }
    }

    // ==================== Items ====================

    /// Replace the open-tabs snapshot
    ///
    /// Tabs missing from `tabs` count as removed and leave the selection.
    pub fn replace_tabs(&mut self, mut tabs: Vec<Item>) {
        repair_tag_refs(&mut tabs, &self.tags.snapshot());
        let kept: HashSet<&ItemId> = tabs.iter().map(|t| &t.id).collect();
        let removed: Vec<ItemId> = self
            .tabs
            .snapshot()
            .tabs
            .iter()
            .filter(|t| !kept.contains(&t.id))
            .map(|t| t.id.clone())
            .collect();

        self.tabs.replace(Arc::new(TabsDoc { tabs }));
        self.selections.get_mut(Domain::Tabs).prune(&removed);
        self.collect_quick_tags();
    }

    pub fn add_bookmark(&self, item: Item) -> EngineResult<ItemId> {
        let id = item.id.clone();
        self.add_bookmarks(vec![item])?;
        Ok(id)
    }

    /// Save bookmarks; an id already saved is overwritten in place
    pub fn add_bookmarks(&self, items: Vec<Item>) -> EngineResult<usize> {
        let tags = self.tags.snapshot();
        if let Some(unknown) = items
            .iter()
            .flat_map(|item| item.tag_ids.iter())
            .find(|id| !tags.contains(**id))
        {
            return Err(EngineError::UnknownTag(*unknown));
        }

        let count = items.len();
        self.bookmarks.update(|doc| {
            for mut item in items {
                item.tag_ids = normalize_tag_ids(item.tag_ids);
                match doc.bookmarks.iter_mut().find(|b| b.id == item.id) {
                    Some(existing) => *existing = item,
                    None => doc.bookmarks.push(item),
                }
            }
            count > 0
        });
        self.collect_quick_tags();
        Ok(count)
    }

    /// Delete items; returns how many existed
    pub fn remove_items(&mut self, domain: Domain, ids: &[ItemId]) -> usize {
        let doomed: HashSet<&ItemId> = ids.iter().collect();
        let mut removed = 0;
        self.update_items(domain, |items| {
            let before = items.len();
            items.retain(|item| !doomed.contains(&item.id));
            removed = before - items.len();
            removed > 0
        });

        self.selections.get_mut(domain).prune(ids);
        if removed > 0 {
            debug!("Removed {} {}", removed, domain);
            self.collect_quick_tags();
        }
        removed
    }

    /// Close tabs through the browser
    ///
    /// Closed tabs leave the collection and enter the recently-closed list.
    /// Tabs the bridge fails to close stay untouched.
    pub async fn close_tabs(&mut self, bridge: &dyn TabsBridge, ids: &[ItemId]) -> BulkReport {
        let tabs = self.tabs.snapshot();
        let mut report = BulkReport::default();
        let mut closed = Vec::new();

        for id in ids {
            let Some(tab) = tabs.tabs.iter().find(|t| &t.id == id) else {
                report.failed += 1;
                continue;
            };
            match bridge.close_tab(id).await {
                Ok(()) => {
                    report.succeeded.push(id.clone());
                    closed.push(tab.clone());
                }
                Err(e) => {
                    debug!("Closing tab '{}' failed: {:#}", id, e);
                    report.failed += 1;
                }
            }
        }

        if report.failed > 0 {
            warn!("Failed to close {} of {} tabs", report.failed, ids.len());
        }
        if !closed.is_empty() {
            self.push_recently_closed(closed);
            self.remove_items(Domain::Tabs, &report.succeeded);
        }
        report
    }

    fn push_recently_closed(&self, items: Vec<Item>) {
        let limit = self.config.recently_closed_limit;
        let now = Utc::now();
        self.recently_closed.update(|doc| {
            let mut entries: Vec<ClosedItem> = items
                .into_iter()
                .rev()
                .map(|item| ClosedItem {
                    item,
                    closed_at: now,
                })
                .collect();
            entries.append(&mut doc.items);
            entries.truncate(limit);
            doc.items = entries;
            true
        });
    }

    /// Take an entry off the recently-closed list
    ///
    /// Reopening the tab is the caller's job.
    pub fn restore_closed(&self, id: &ItemId) -> Option<Item> {
        let mut restored = None;
        self.recently_closed.update(|doc| {
            let position = doc.items.iter().position(|c| &c.item.id == id);
            match position {
                Some(index) => {
                    restored = Some(doc.items.remove(index).item);
                    true
                }
                None => false,
            }
        });
        restored
    }

    // ==================== Tags ====================

    pub fn create_tag(&self, name: &str, color: &str) -> EngineResult<Tag> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::EmptyTagName);
        }
        Ok(self.insert_tag(|id| Tag::new(id, name, color)))
    }

    /// Create an ephemeral tag named after the current time
    pub fn create_quick_tag(&self) -> Tag {
        let name = quick_tags::quick_tag_name(Utc::now());
        self.insert_tag(|id| {
            let mut tag = Tag::new(id, name, QUICK_TAG_COLOR);
            tag.is_quick = true;
            tag
        })
    }

    fn insert_tag(&self, build: impl FnOnce(TagId) -> Tag) -> Tag {
        let tag = build(self.tags.snapshot().next_id());
        let created = tag.clone();
        self.tags.update(|doc| {
            doc.tags.push(created);
            true
        });
        tag
    }

    pub fn rename_tag(&self, id: TagId, name: &str) -> EngineResult<()> {
        if id == UNTAGGED_TAG_ID {
            return Err(EngineError::SentinelTag);
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::EmptyTagName);
        }
        self.modify_tag(id, |tag| {
            tag.name = name.to_string();
        })
    }

    pub fn recolor_tag(&self, id: TagId, color: &str) -> EngineResult<()> {
        self.modify_tag(id, |tag| {
            tag.color = color.to_string();
        })
    }

    /// Flip a tag's favorite flag; returns the new value
    pub fn toggle_favorite(&self, id: TagId) -> EngineResult<bool> {
        let mut favorite = false;
        self.modify_tag(id, |tag| {
            tag.favorite = !tag.favorite;
            favorite = tag.favorite;
        })?;
        Ok(favorite)
    }

    fn modify_tag(&self, id: TagId, f: impl FnOnce(&mut Tag)) -> EngineResult<()> {
        if !self.tags.snapshot().contains(id) {
            return Err(EngineError::UnknownTag(id));
        }
        self.tags.update(|doc| match doc.tags.iter_mut().find(|t| t.id == id) {
            Some(tag) => {
                f(tag);
                tag.updated_at = Utc::now();
                true
            }
            None => false,
        });
        Ok(())
    }

    /// Delete a tag; items left without tags fall back to Untagged
    pub fn delete_tag(&self, id: TagId) -> EngineResult<()> {
        if id == UNTAGGED_TAG_ID {
            return Err(EngineError::SentinelTag);
        }
        if !self.tags.snapshot().contains(id) {
            return Err(EngineError::UnknownTag(id));
        }

        self.remove_tags(&[id]);
        self.tags.update(|doc| {
            doc.tags.retain(|t| t.id != id);
            true
        });
        Ok(())
    }

    // ==================== Tagging ====================

    /// Add `tag_id` to the given items; returns how many changed
    pub fn tag_items(&self, domain: Domain, ids: &[ItemId], tag_id: TagId) -> EngineResult<usize> {
        self.require_tag(tag_id)?;
        let changed = self.modify_items(domain, ids, |item| item.add_tag(tag_id));
        self.collect_quick_tags();
        Ok(changed)
    }

    /// Remove `tag_id` from the given items; returns how many changed
    pub fn untag_items(
        &self,
        domain: Domain,
        ids: &[ItemId],
        tag_id: TagId,
    ) -> EngineResult<usize> {
        self.require_tag(tag_id)?;
        let changed = self.modify_items(domain, ids, |item| item.remove_tag(tag_id));
        self.collect_quick_tags();
        Ok(changed)
    }

    /// Replace one item's tags
    pub fn set_item_tags(
        &self,
        domain: Domain,
        id: &ItemId,
        tag_ids: &[TagId],
    ) -> EngineResult<()> {
        for tag_id in tag_ids {
            self.require_tag(*tag_id)?;
        }
        if self.find_item(domain, id).is_none() {
            return Err(EngineError::UnknownItem {
                id: id.clone(),
                domain,
            });
        }
        self.modify_items(domain, std::slice::from_ref(id), |item| {
            item.set_tags(tag_ids.iter().copied())
        });
        self.collect_quick_tags();
        Ok(())
    }

    /// Strip tags from every item in both collections
    ///
    /// The tags themselves stay defined. Returns how many items changed.
    pub fn remove_tags(&self, tag_ids: &[TagId]) -> usize {
        let strip = |items: &mut Vec<Item>| {
            let mut changed = 0;
            for item in items.iter_mut() {
                let kept: Vec<TagId> = item
                    .tag_ids
                    .iter()
                    .copied()
                    .filter(|id| !tag_ids.contains(id))
                    .collect();
                if item.set_tags(kept) {
                    changed += 1;
                }
            }
            changed
        };

        let mut changed = 0;
        self.tabs.update(|doc| {
            changed += strip(&mut doc.tabs);
            changed > 0
        });
        let from_tabs = changed;
        self.bookmarks.update(|doc| {
            changed += strip(&mut doc.bookmarks);
            changed > from_tabs
        });
        self.collect_quick_tags();
        changed
    }

    /// Tag items with a fresh quick tag
    pub fn quick_save(&self, domain: Domain, ids: &[ItemId]) -> EngineResult<Tag> {
        let tag = self.create_quick_tag();
        self.tag_items(domain, ids, tag.id)?;
        Ok(tag)
    }

    fn require_tag(&self, id: TagId) -> EngineResult<()> {
        if self.tags.snapshot().contains(id) {
            Ok(())
        } else {
            Err(EngineError::UnknownTag(id))
        }
    }

    fn update_items(&self, domain: Domain, f: impl FnOnce(&mut Vec<Item>) -> bool) -> bool {
        match domain {
            Domain::Tabs => self.tabs.update(|doc| f(&mut doc.tabs)),
            Domain::Bookmarks => self.bookmarks.update(|doc| f(&mut doc.bookmarks)),
        }
    }

    fn modify_items(
        &self,
        domain: Domain,
        ids: &[ItemId],
        mut f: impl FnMut(&mut Item) -> bool,
    ) -> usize {
        let targets: HashSet<&ItemId> = ids.iter().collect();
        let mut changed = 0;
        self.update_items(domain, |items| {
            for item in items.iter_mut().filter(|item| targets.contains(&item.id)) {
                if f(item) {
                    changed += 1;
                }
            }
            changed > 0
        });
        changed
    }

    /// Drop quick tags nothing references any more
    fn collect_quick_tags(&self) {
        let tabs = self.tabs.snapshot();
        let bookmarks = self.bookmarks.snapshot();
        collect_quick_tags(&self.tags, &[tabs.items(), bookmarks.items()]);
    }

    // ==================== Curation ====================

    /// Ranked curation queue over saved bookmarks
    pub fn curate_queue(&self, manual: &HashSet<ItemId>) -> Vec<InclusionResult> {
        let curate = self.curate.snapshot();
        curate::curate_queue(
            &self.bookmarks.snapshot().bookmarks,
            &self.tags.snapshot(),
            &curate.settings,
            manual,
            Utc::now(),
        )
    }

    pub fn update_curate_settings(&self, settings: CurateSettings) {
        self.curate.update(|doc| {
            if doc.settings == settings {
                return false;
            }
            doc.settings = settings;
            true
        });
    }

    /// Start a session over the current queue, finishing any active one
    pub fn start_curate_session(&self, manual: &HashSet<ItemId>) -> CurateSession {
        let queue: Vec<ItemId> = self
            .curate_queue(manual)
            .into_iter()
            .map(|result| result.item_id)
            .collect();
        let session = CurateSession::new(queue);
        let now = Utc::now();

        let started = session.clone();
        self.curate.update(|doc| {
            for active in doc.sessions.iter_mut().filter(|s| s.is_active()) {
                active.finished_at = Some(now);
            }
            doc.sessions.push(started);
            true
        });
        info!("Started curation session with {} items", session.item_ids.len());
        session
    }

    /// Record that a bookmark was handled in the active session
    pub fn mark_curated(&self, id: &ItemId) -> EngineResult<()> {
        if self.curate.snapshot().active_session().is_none() {
            return Err(EngineError::NoActiveSession);
        }
        if self.find_item(Domain::Bookmarks, id).is_none() {
            return Err(EngineError::UnknownItem {
                id: id.clone(),
                domain: Domain::Bookmarks,
            });
        }

        let now = Utc::now();
        self.modify_items(Domain::Bookmarks, std::slice::from_ref(id), |item| {
            item.last_curated_at = Some(now);
            true
        });
        self.curate.update(|doc| match doc.sessions.iter_mut().rev().find(|s| s.is_active()) {
            Some(session) if !session.curated_ids.contains(id) => {
                session.curated_ids.push(id.clone());
                true
            }
            _ => false,
        });
        Ok(())
    }

    pub fn finish_curate_session(&self) -> EngineResult<CurateSession> {
        let mut finished = None;
        let now = Utc::now();
        self.curate.update(|doc| match doc.sessions.iter_mut().rev().find(|s| s.is_active()) {
            Some(session) => {
                session.finished_at = Some(now);
                finished = Some(session.clone());
                true
            }
            None => false,
        });
        finished.ok_or(EngineError::NoActiveSession)
    }
}

fn open_store<T>(
    (storage, key, instance_id, debounce): (Arc<dyn StorageMedium>, String, InstanceId, Duration),
) -> DocumentStore<T>
where
    T: DocumentData + Clone + Default,
{
    DocumentStore::new(PersistenceGateway::new(storage, key, instance_id, debounce))
}

fn collect_quick_tags(tags: &DocumentStore<TagsDoc>, collections: &[&[Item]]) {
    let current = tags.snapshot();
    if let Some(next) = quick_tags::collect_garbage(&current, collections) {
        debug!(
            "Collected {} unused quick tags",
            current.tags.len() - next.tags.len()
        );
        tags.replace(Arc::new(next));
    }
}

/// Remote hook for one item collection
///
/// Drops references to tags this instance doesn't know, then collects quick
/// tags against the incoming collection and the current `other` one.
fn reconcile_remote<D, O>(
    tags: Arc<DocumentStore<TagsDoc>>,
    other: watch::Receiver<Arc<O>>,
) -> impl FnMut(&mut D) -> bool + Send + 'static
where
    D: ItemCollection + 'static,
    O: ItemCollection + Send + Sync + 'static,
{
    move |doc: &mut D| {
        let known = tags.snapshot();
        let repaired = repair_tag_refs(doc.items_mut(), &known);
        if repaired {
            debug!("Dropped unknown tag references from remote {}", D::DOMAIN);
        }
        let other = Arc::clone(&other.borrow());
        collect_quick_tags(&tags, &[doc.items(), other.items()]);
        repaired
    }
}

fn ids_of(items: &[Item]) -> HashSet<ItemId> {
    items.iter().map(|item| item.id.clone()).collect()
}

/// Make sure the sentinel tag exists
fn ensure_sentinel(doc: &mut TagsDoc) -> bool {
    if doc.contains(UNTAGGED_TAG_ID) {
        return false;
    }
    doc.tags.insert(0, Tag::untagged());
    true
}

/// Drop references to tags that don't exist and re-normalize
fn repair_tag_refs(items: &mut [Item], tags: &TagsDoc) -> bool {
    let mut changed = false;
    for item in items.iter_mut() {
        let valid: Vec<TagId> = item
            .tag_ids
            .iter()
            .copied()
            .filter(|id| tags.contains(*id))
            .collect();
        changed |= item.set_tags(valid);
    }
    changed
}
