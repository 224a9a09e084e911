//! In-memory storage medium
//!
//! Used by tests and by embedders that bring their own durability. Several
//! engines sharing one `Arc<MemoryStorage>` behave like several browser
//! contexts sharing one extension storage area.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use super::error::{StorageError, StorageResult};
use super::medium::{ChangeFeed, StorageChange, StorageMedium};

#[derive(Debug)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Value>>,
    feed: ChangeFeed,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            feed: ChangeFeed::new(),
            quota_bytes: None,
        }
    }

    /// Reject writes that would push the encoded total past `bytes`
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            quota_bytes: Some(bytes),
            ..Self::new()
        }
    }

    /// Keys currently holding a value, sorted
    pub fn keys(&self) -> Vec<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn encoded_len(key: &str, value: &Value) -> usize {
    key.len() + value.to_string().len()
}

#[async_trait]
impl StorageMedium for MemoryStorage {
    async fn get_item(&self, key: &str) -> StorageResult<Option<Value>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: Value) -> StorageResult<()> {
        let old = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(quota) = self.quota_bytes {
                let others: usize = entries
                    .iter()
                    .filter(|(k, _)| k.as_str() != key)
                    .map(|(k, v)| encoded_len(k, v))
                    .sum();
                let total = others + encoded_len(key, &value);
                if total > quota {
                    return Err(StorageError::Rejected {
                        key: key.to_string(),
                        reason: format!("quota of {} bytes exceeded ({} needed)", quota, total),
                    });
                }
            }
            entries.insert(key.to_string(), value.clone())
        };
        self.feed.publish(key, old, Some(value));
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        let old = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.remove(key)
        };
        self.feed.publish(key, old, None);
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<StorageChange> {
        self.feed.subscribe()
    }
}
