//! tabkeep core library
//!
//! Local-first persistence and derived views for open tabs, bookmarks and
//! tags. Every collection lives in memory as an `Arc` snapshot and is
//! written through to a key-value storage medium.
//!
//! # Architecture
//!
//! - **storage**: async key-value media (in-memory, SQLite) with change feeds
//! - **persistence**: per-key gateway with debounced writes and echo filtering
//! - **store**: copy-on-write document stores built on a gateway
//! - **migration**: one-shot upgrade from the legacy storage layout
//! - **engine**: owns the stores, enforces tag invariants
//! - **views / search / selection / curate**: pure read-side derivations
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let storage = Arc::new(SqliteStorage::open(&config.sqlite_path())?);
//! let engine = Engine::init(storage, config).await;
//!
//! let tag = engine.create_tag("reading", "#3b82f6")?;
//! engine.add_bookmark(Item::new("https://example.com").tagged([tag.id]))?;
//!
//! engine.dispose().await;
//! ```

pub mod config;
pub mod curate;
pub mod engine;
pub mod migration;
pub mod models;
pub mod persistence;
pub mod quick_tags;
pub mod search;
pub mod selection;
pub mod storage;
pub mod store;
pub mod views;

pub use config::Config;
pub use curate::{CurateSettings, InclusionReasons, InclusionResult, Period, ReasonKind, TimeUnit};
pub use engine::{BulkReport, Engine, EngineError, EngineResult, TabsBridge};
pub use migration::{MigrationMarker, MigrationRunner};
pub use models::{
    BookmarksDoc, CurateDoc, Domain, Item, ItemCollection, ItemId, RecentlyClosedDoc, Tag, TagId,
    TabsDoc, TagsDoc, UNTAGGED_TAG_ID,
};
pub use persistence::{Document, InstanceId, PersistenceGateway, SaveOptions, Subscription};
pub use search::{SearchHit, SearchIndex, WeightedIndex};
pub use selection::{SelectionTracker, Selections};
pub use storage::{MemoryStorage, SqliteStorage, StorageError, StorageMedium};
pub use store::DocumentStore;
pub use views::{Filter, GroupSort, Grouping, Sort, SortDir, SortProp, View, ViewCache, ViewConfig};
