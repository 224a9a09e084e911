//! Storage layer
//!
//! ## Architecture
//!
//! - **StorageMedium**: async key-value store with a change feed
//! - **MemoryStorage**: process-local medium, shared between engines via `Arc`
//! - **SqliteStorage**: durable medium, one row per key
//!
//! Values are JSON. Document envelopes and echo suppression live one level
//! up, in the persistence gateway.

pub mod error;
pub mod medium;
pub mod memory;
pub mod schema;
pub mod sqlite;

pub use error::{StorageError, StorageResult};
pub use medium::{StorageChange, StorageMedium};
pub use memory::MemoryStorage;
pub use schema::SCHEMA_VERSION;
pub use sqlite::SqliteStorage;
