//! Storage medium abstraction
//!
//! A storage medium is an asynchronous key-value store holding JSON values,
//! plus a change feed. Every successful `set_item`/`remove_item` that alters
//! a key publishes one [`StorageChange`] to all watchers, including the
//! writer's own watchers. Telling echoes apart is the gateway's job.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use super::error::StorageResult;

/// Capacity of the change feed before slow watchers start lagging
const CHANGE_FEED_CAPACITY: usize = 256;

/// A change to one key
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// Asynchronous key-value storage with a change stream
#[async_trait]
pub trait StorageMedium: Send + Sync {
    /// Read the value stored under `key`
    async fn get_item(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set_item(&self, key: &str, value: Value) -> StorageResult<()>;

    /// Remove `key`; removing a missing key is not an error
    async fn remove_item(&self, key: &str) -> StorageResult<()>;

    /// Subscribe to changes on every key
    fn watch(&self) -> broadcast::Receiver<StorageChange>;
}

/// Broadcast fan-out shared by the medium implementations
#[derive(Debug)]
pub(crate) struct ChangeFeed {
    tx: broadcast::Sender<StorageChange>,
}

impl ChangeFeed {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.tx.subscribe()
    }

    /// Publish a change unless the value is unchanged
    pub(crate) fn publish(&self, key: &str, old_value: Option<Value>, new_value: Option<Value>) {
        if old_value == new_value {
            return;
        }
        // No receivers is fine
        let _ = self.tx.send(StorageChange {
            key: key.to_string(),
            old_value,
            new_value,
        });
    }
}
