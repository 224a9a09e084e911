//! SQLite-backed storage medium
//!
//! Durable key-value storage for the CLI. Change events are published to
//! watchers in this process only; another process writing the same file is
//! picked up on its next load.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::broadcast;

use super::error::{StorageError, StorageResult};
use super::medium::{ChangeFeed, StorageChange, StorageMedium};
use super::schema::{init_schema, needs_init};

pub struct SqliteStorage {
    conn: Mutex<Connection>,
    feed: ChangeFeed,
}

impl SqliteStorage {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        if needs_init(&conn) {
            init_schema(&conn)?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
            feed: ChangeFeed::new(),
        })
    }

    /// Number of stored keys
    pub fn key_count(&self) -> StorageResult<i64> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let count = conn.query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn read_value(conn: &Connection, key: &str) -> StorageResult<Option<Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
            row.get(0)
        })
        .optional()?;

    match raw {
        Some(text) => {
            let value =
                serde_json::from_str(&text).map_err(|e| StorageError::InvalidValue {
                    key: key.to_string(),
                    details: e.to_string(),
                })?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

#[async_trait]
impl StorageMedium for SqliteStorage {
    async fn get_item(&self, key: &str) -> StorageResult<Option<Value>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        read_value(&conn, key)
    }

    async fn set_item(&self, key: &str, value: Value) -> StorageResult<()> {
        let text = serde_json::to_string(&value)?;
        let old = {
            let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
            // A corrupt previous value is just replaced
            let old = read_value(&conn, key).unwrap_or(None);
            conn.execute(
                r#"
                INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                "#,
                params![key, text, Utc::now().timestamp_millis()],
            )?;
            old
        };
        self.feed.publish(key, old, Some(value));
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        let old = {
            let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
            let old = read_value(&conn, key).unwrap_or(None);
            conn.execute("DELETE FROM kv WHERE key = ?", params![key])?;
            old
        };
        self.feed.publish(key, old, None);
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<StorageChange> {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_set_and_get() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        assert!(storage.get_item("bookmarks").await.unwrap().is_none());

        let value = json!({"data": {"bookmarks": []}, "instanceId": "a", "version": 1});
        storage.set_item("bookmarks", value.clone()).await.unwrap();

        assert_eq!(storage.get_item("bookmarks").await.unwrap(), Some(value));
        assert_eq!(storage.key_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_overwrite_and_remove() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut rx = storage.watch();

        storage.set_item("k", json!(1)).await.unwrap();
        storage.set_item("k", json!(2)).await.unwrap();
        storage.remove_item("k").await.unwrap();

        assert!(storage.get_item("k").await.unwrap().is_none());
        assert_eq!(storage.key_count().unwrap(), 0);

        let events: Vec<StorageChange> = (0..3).map(|_| rx.try_recv().unwrap()).collect();
        assert_eq!(events[1].old_value, Some(json!(1)));
        assert_eq!(events[2].new_value, None);
    }

    #[tokio::test]
    async fn test_corrupt_value_is_an_error() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        {
            let conn = storage.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES ('tags', '{not json', 0)",
                [],
            )
            .unwrap();
        }

        let err = storage.get_item("tags").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidValue { .. }));

        // Writing over it works
        storage.set_item("tags", json!({})).await.unwrap();
        assert_eq!(storage.get_item("tags").await.unwrap(), Some(json!({})));
    }

    #[tokio::test]
    async fn test_data_persists_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("tabkeep.db");

        {
            let storage = SqliteStorage::open(&path).unwrap();
            storage.set_item("tabs", json!({"tabs": []})).await.unwrap();
        }

        let storage = SqliteStorage::open(&path).unwrap();
        assert_eq!(
            storage.get_item("tabs").await.unwrap(),
            Some(json!({"tabs": []}))
        );
    }
}
