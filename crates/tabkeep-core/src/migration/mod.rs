//! One-shot migration from the legacy storage layout
//!
//! Each [`Migration`] maps one legacy key to one current key through a
//! transform. [`MigrationRunner::run`] applies all mappings once per
//! installation and then records a completion marker; with the marker
//! present the runner never touches storage again, except for an explicit
//! [`MigrationRunner::cleanup`].
//!
//! Rules:
//! - live data under a current key is never overwritten
//! - a failing mapping is logged and skipped, the others still run
//! - the marker is written even after partial failure, so a broken legacy
//!   value can't block every boot

pub mod legacy;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::persistence::{Document, InstanceId, DOCUMENT_VERSION};
use crate::storage::StorageMedium;

pub use legacy::default_migrations;

/// Storage key of the completion marker
pub const MIGRATION_MARKER_KEY: &str = "migration-complete";

/// Converts a legacy value into current document data; `None` skips the write
pub type Transform = Box<dyn Fn(Value) -> Result<Option<Value>> + Send + Sync>;

/// Mapping from one legacy key to one current key
pub struct Migration {
    pub legacy_key: String,
    pub current_key: String,
    transform: Transform,
}

impl Migration {
    pub fn new<F>(
        legacy_key: impl Into<String>,
        current_key: impl Into<String>,
        transform: F,
    ) -> Self
    where
        F: Fn(Value) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        Self {
            legacy_key: legacy_key.into(),
            current_key: current_key.into(),
            transform: Box::new(transform),
        }
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("legacy_key", &self.legacy_key)
            .field("current_key", &self.current_key)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerReason {
    /// Nothing to migrate on this installation
    NoOldData,
    /// Mappings were processed
    Migrated,
}

/// Persisted proof that migration ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationMarker {
    pub completed_at: DateTime<Utc>,
    pub reason: MarkerReason,
    #[serde(default)]
    pub migrated: usize,
    #[serde(default)]
    pub skipped: usize,
    #[serde(default)]
    pub failed: usize,
}

enum Outcome {
    Migrated,
    Skipped,
}

pub struct MigrationRunner {
    storage: Arc<dyn StorageMedium>,
    instance_id: InstanceId,
    migrations: Vec<Migration>,
}

impl MigrationRunner {
    pub fn new(
        storage: Arc<dyn StorageMedium>,
        instance_id: InstanceId,
        migrations: Vec<Migration>,
    ) -> Self {
        Self {
            storage,
            instance_id,
            migrations,
        }
    }

    /// Runner with the built-in legacy mappings
    pub fn with_defaults(storage: Arc<dyn StorageMedium>, instance_id: InstanceId) -> Self {
        Self::new(storage, instance_id, default_migrations())
    }

    /// Read the completion marker, if any
    pub async fn marker(&self) -> Result<Option<MigrationMarker>> {
        let raw = self
            .storage
            .get_item(MIGRATION_MARKER_KEY)
            .await
            .context("Failed to read migration marker")?;
        match raw {
            Some(value) => {
                let marker =
                    serde_json::from_value(value).context("Invalid migration marker")?;
                Ok(Some(marker))
            }
            None => Ok(None),
        }
    }

    /// Migrate legacy data; returns whether anything was written
    pub async fn run(&self) -> Result<bool> {
        if self
            .storage
            .get_item(MIGRATION_MARKER_KEY)
            .await
            .context("Failed to read migration marker")?
            .is_some()
        {
            debug!("Migration already complete");
            return Ok(false);
        }

        if !self.has_legacy_data().await {
            info!("No legacy data found, marking migration complete");
            self.write_marker(MarkerReason::NoOldData, 0, 0, 0).await?;
            return Ok(false);
        }

        let (mut migrated, mut skipped, mut failed) = (0, 0, 0);
        for migration in &self.migrations {
            match self.apply(migration).await {
                Ok(Outcome::Migrated) => migrated += 1,
                Ok(Outcome::Skipped) => skipped += 1,
                Err(e) => {
                    warn!("Migration of '{}' failed: {:#}", migration.legacy_key, e);
                    failed += 1;
                }
            }
        }

        info!(
            "Migration finished: {} migrated, {} skipped, {} failed",
            migrated, skipped, failed
        );
        self.write_marker(MarkerReason::Migrated, migrated, skipped, failed)
            .await?;
        Ok(migrated > 0)
    }

    /// Remove all legacy keys once migration is complete
    ///
    /// Returns `false` without touching storage when the marker is absent.
    pub async fn cleanup(&self) -> Result<bool> {
        if self.marker().await?.is_none() {
            warn!("Refusing legacy cleanup before migration has completed");
            return Ok(false);
        }

        for migration in &self.migrations {
            self.storage
                .remove_item(&migration.legacy_key)
                .await
                .with_context(|| {
                    format!("Failed to remove legacy key '{}'", migration.legacy_key)
                })?;
        }
        info!("Removed {} legacy keys", self.migrations.len());
        Ok(true)
    }

    /// Whether any legacy key holds data
    ///
    /// An unreadable legacy key counts as holding data, so its mapping fails
    /// on its own and the marker still gets written.
    async fn has_legacy_data(&self) -> bool {
        for migration in &self.migrations {
            match self.storage.get_item(&migration.legacy_key).await {
                Ok(Some(_)) => return true,
                Ok(None) => {}
                Err(e) => {
                    debug!("Legacy key '{}' unreadable: {}", migration.legacy_key, e);
                    return true;
                }
            }
        }
        false
    }

    async fn apply(&self, migration: &Migration) -> Result<Outcome> {
        if self.storage.get_item(&migration.current_key).await?.is_some() {
            debug!(
                "'{}' already holds data, skipping '{}'",
                migration.current_key, migration.legacy_key
            );
            return Ok(Outcome::Skipped);
        }

        let Some(legacy) = self
            .storage
            .get_item(&migration.legacy_key)
            .await
            .with_context(|| format!("Failed to read legacy key '{}'", migration.legacy_key))?
        else {
            return Ok(Outcome::Skipped);
        };

        let Some(data) = (migration.transform)(legacy)? else {
            return Ok(Outcome::Skipped);
        };

        let document = Document {
            data,
            instance_id: self.instance_id.clone(),
            version: DOCUMENT_VERSION,
        };
        self.storage
            .set_item(&migration.current_key, serde_json::to_value(document)?)
            .await?;
        debug!(
            "Migrated '{}' to '{}'",
            migration.legacy_key, migration.current_key
        );
        Ok(Outcome::Migrated)
    }

    async fn write_marker(
        &self,
        reason: MarkerReason,
        migrated: usize,
        skipped: usize,
        failed: usize,
    ) -> Result<()> {
        let marker = MigrationMarker {
            completed_at: Utc::now(),
            reason,
            migrated,
            skipped,
            failed,
        };
        self.storage
            .set_item(MIGRATION_MARKER_KEY, serde_json::to_value(&marker)?)
            .await
            .context("Failed to write migration marker")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, StorageChange};
    use anyhow::bail;
    use serde_json::json;
    use tokio::sync::broadcast;

    fn runner(storage: &Arc<MemoryStorage>, migrations: Vec<Migration>) -> MigrationRunner {
        MigrationRunner::new(storage.clone(), InstanceId::from("migrator"), migrations)
    }

    fn passthrough(legacy: &str, current: &str) -> Migration {
        Migration::new(legacy, current, |value| Ok(Some(value)))
    }

    fn drain(rx: &mut broadcast::Receiver<StorageChange>) -> usize {
        let mut n = 0;
        while rx.try_recv().is_ok() {
            n += 1;
        }
        n
    }

    #[tokio::test]
    async fn test_no_legacy_data_sets_marker() {
        let storage = Arc::new(MemoryStorage::new());
        let runner = runner(&storage, vec![passthrough("old", "new")]);

        assert!(!runner.run().await.unwrap());

        let marker = runner.marker().await.unwrap().unwrap();
        assert_eq!(marker.reason, MarkerReason::NoOldData);
        assert!(storage.get_item("new").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_migrates_and_wraps_envelope() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("old", json!({"x": 1})).await.unwrap();
        let runner = runner(&storage, vec![passthrough("old", "new")]);

        assert!(runner.run().await.unwrap());

        let written = storage.get_item("new").await.unwrap().unwrap();
        assert_eq!(written["data"], json!({"x": 1}));
        assert_eq!(written["version"], 1);
        assert_eq!(written["instanceId"], "migrator");

        let marker = runner.marker().await.unwrap().unwrap();
        assert_eq!(marker.reason, MarkerReason::Migrated);
        assert_eq!(marker.migrated, 1);
    }

    #[tokio::test]
    async fn test_second_run_performs_no_writes() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("old", json!({"x": 1})).await.unwrap();
        let runner = runner(&storage, vec![passthrough("old", "new")]);
        runner.run().await.unwrap();
        let after_first = storage.get_item("new").await.unwrap();

        let mut changes = storage.watch();
        assert!(!runner.run().await.unwrap());
        assert_eq!(drain(&mut changes), 0);
        assert_eq!(storage.get_item("new").await.unwrap(), after_first);
    }

    #[tokio::test]
    async fn test_never_overwrites_current_data() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("old", json!("legacy")).await.unwrap();
        storage.set_item("new", json!("live")).await.unwrap();
        let runner = runner(&storage, vec![passthrough("old", "new")]);

        assert!(!runner.run().await.unwrap());
        assert_eq!(storage.get_item("new").await.unwrap(), Some(json!("live")));
        assert_eq!(runner.marker().await.unwrap().unwrap().skipped, 1);
    }

    #[tokio::test]
    async fn test_failing_mapping_does_not_block_others() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("old-a", json!(1)).await.unwrap();
        storage.set_item("old-b", json!(2)).await.unwrap();

        let failing = Migration::new("old-a", "new-a", |_| bail!("broken legacy value"));
        let runner = runner(&storage, vec![failing, passthrough("old-b", "new-b")]);

        assert!(runner.run().await.unwrap());
        assert!(storage.get_item("new-a").await.unwrap().is_none());
        assert!(storage.get_item("new-b").await.unwrap().is_some());

        let marker = runner.marker().await.unwrap().unwrap();
        assert_eq!((marker.migrated, marker.failed), (1, 1));

        // Marked complete anyway
        assert!(!runner.run().await.unwrap());
    }

    #[tokio::test]
    async fn test_unreadable_legacy_key_fails_alone() {
        use crate::storage::SqliteStorage;
        use rusqlite::Connection;
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tabkeep.db");
        let storage = Arc::new(SqliteStorage::open(&path).unwrap());
        storage.set_item("old-a", json!(1)).await.unwrap();
        storage.set_item("old-b", json!({"x": 2})).await.unwrap();
        Connection::open(&path)
            .unwrap()
            .execute("UPDATE kv SET value = '{not json' WHERE key = 'old-a'", [])
            .unwrap();

        let runner = MigrationRunner::new(
            storage.clone(),
            InstanceId::from("migrator"),
            vec![passthrough("old-a", "new-a"), passthrough("old-b", "new-b")],
        );

        assert!(runner.run().await.unwrap());
        assert!(storage.get_item("new-a").await.unwrap().is_none());
        assert!(storage.get_item("new-b").await.unwrap().is_some());

        let marker = runner.marker().await.unwrap().unwrap();
        assert_eq!((marker.migrated, marker.failed), (1, 1));
        assert!(!runner.run().await.unwrap());
    }

    #[tokio::test]
    async fn test_transform_returning_none_skips() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("old", json!(null)).await.unwrap();
        let runner = runner(&storage, vec![Migration::new("old", "new", |_| Ok(None))]);

        assert!(!runner.run().await.unwrap());
        assert!(storage.get_item("new").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_requires_marker() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("old", json!(1)).await.unwrap();
        let runner = runner(&storage, vec![passthrough("old", "new")]);

        assert!(!runner.cleanup().await.unwrap());
        assert!(storage.get_item("old").await.unwrap().is_some());

        runner.run().await.unwrap();
        assert!(runner.cleanup().await.unwrap());
        assert!(storage.get_item("old").await.unwrap().is_none());
        assert!(storage.get_item("new").await.unwrap().is_some());
    }
}
