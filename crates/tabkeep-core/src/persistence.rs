//! Document persistence
//!
//! A [`PersistenceGateway`] owns one storage key. It wraps the data in a
//! [`Document`] envelope tagged with the engine's [`InstanceId`], coalesces
//! bursts of saves into one trailing write, and filters the medium's change
//! feed so that only writes from *other* instances reach the caller.
//!
//! Writes go through a background writer task:
//!
//! ```text
//! save(a) ─┐
//! save(b) ─┼─> [writer: deadline reset on every save] ──> set_item(key, b)
//! save(c) ─┘                                          (only the latest)
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::StorageMedium;

/// Schema version stamped on every written envelope
pub const DOCUMENT_VERSION: u32 = 1;

/// Identifies one engine instance for its whole lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The envelope written to storage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document<T> {
    pub data: T,
    pub instance_id: InstanceId,
    pub version: u32,
}

/// Anything that can live in a document
pub trait DocumentData: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> DocumentData for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Skip the debounce window and write right away
    pub immediate: bool,
}

impl SaveOptions {
    pub fn immediate() -> Self {
        Self { immediate: true }
    }
}

enum WriterCommand<T> {
    Save { data: Arc<T>, immediate: bool },
    Flush(oneshot::Sender<()>),
}

/// Persists one logical document under one storage key
pub struct PersistenceGateway<T> {
    key: String,
    instance_id: InstanceId,
    storage: Arc<dyn StorageMedium>,
    /// Last value saved, loaded, or received from another instance
    last_known: Arc<Mutex<Option<Arc<T>>>>,
    tx: mpsc::UnboundedSender<WriterCommand<T>>,
}

impl<T: DocumentData> PersistenceGateway<T> {
    /// Create a gateway and spawn its writer task
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        storage: Arc<dyn StorageMedium>,
        key: impl Into<String>,
        instance_id: InstanceId,
        debounce: Duration,
    ) -> Self {
        let key = key.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let writer = Writer {
            key: key.clone(),
            instance_id: instance_id.clone(),
            storage: Arc::clone(&storage),
        };
        tokio::spawn(run_writer(writer, rx, debounce));

        Self {
            key,
            instance_id,
            storage,
            last_known: Arc::new(Mutex::new(None)),
            tx,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    /// Read the stored document
    ///
    /// Returns `None` when nothing is stored or the stored value can't be
    /// read or decoded; failures are logged, never returned.
    pub async fn load(&self) -> Option<Arc<T>> {
        let raw = match self.storage.get_item(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) if e.is_corrupt_value() => {
                warn!("Discarding unreadable value under '{}': {}", self.key, e);
                return None;
            }
            Err(e) => {
                warn!("Failed to read '{}', starting empty: {}", self.key, e);
                return None;
            }
        };

        let document = decode_document::<T>(&self.key, raw)?;
        let data = Arc::new(document.data);
        *lock(&self.last_known) = Some(Arc::clone(&data));
        Some(data)
    }

    /// Schedule a write of `data`
    ///
    /// Saving the same allocation as the last known value is a no-op.
    pub fn save(&self, data: Arc<T>, options: SaveOptions) {
        {
            let mut last_known = lock(&self.last_known);
            if let Some(previous) = last_known.as_ref() {
                if Arc::ptr_eq(previous, &data) {
                    return;
                }
            }
            *last_known = Some(Arc::clone(&data));
        }

        let command = WriterCommand::Save {
            data,
            immediate: options.immediate,
        };
        if self.tx.send(command).is_err() {
            warn!("Writer for '{}' has stopped, dropping save", self.key);
        }
    }

    /// Wait until any pending write has been attempted
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(WriterCommand::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Listen for writes to this key made by other instances
    ///
    /// Echoes of this gateway's own writes are dropped before the handler
    /// runs. The returned handle stops listening when dropped.
    pub fn subscribe<F>(&self, mut on_remote_change: F) -> Subscription
    where
        F: FnMut(Arc<T>) + Send + 'static,
    {
        let mut changes = self.storage.watch();
        let key = self.key.clone();
        let own_id = self.instance_id.clone();
        let last_known = Arc::clone(&self.last_known);
        let storage = Arc::clone(&self.storage);

        let task = tokio::spawn(async move {
            loop {
                let new_value = match changes.recv().await {
                    Ok(change) if change.key == key => change.new_value,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        // Missed events; the current value is all that matters
                        warn!("Change feed lagged by {} events, re-reading '{}'", skipped, key);
                        match storage.get_item(&key).await {
                            Ok(value) => value,
                            Err(e) => {
                                warn!("Failed to re-read '{}': {}", key, e);
                                continue;
                            }
                        }
                    }
                    Err(RecvError::Closed) => break,
                };

                let Some(raw) = new_value else {
                    debug!("'{}' was removed externally, keeping in-memory data", key);
                    continue;
                };
                let Some(document) = decode_document::<T>(&key, raw) else {
                    continue;
                };
                if document.instance_id == own_id {
                    debug!("Ignoring echo of own write to '{}'", key);
                    continue;
                }

                let data = Arc::new(document.data);
                *lock(&last_known) = Some(Arc::clone(&data));
                on_remote_change(data);
            }
        });

        Subscription { task }
    }
}

/// Handle for a remote-change listener
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Writer {
    key: String,
    instance_id: InstanceId,
    storage: Arc<dyn StorageMedium>,
}

impl Writer {
    async fn write<T: Serialize>(&self, data: &T) {
        let document = Document {
            data,
            instance_id: self.instance_id.clone(),
            version: DOCUMENT_VERSION,
        };

        let value = match serde_json::to_value(&document) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to encode '{}': {}", self.key, e);
                return;
            }
        };

        // Not retried; the next save writes the full document again
        if let Err(e) = self.storage.set_item(&self.key, value).await {
            warn!("Failed to write '{}': {}", self.key, e);
        }
    }

    async fn write_pending<T: Serialize>(&self, pending: &mut Option<Arc<T>>, coalesced: usize) {
        if let Some(data) = pending.take() {
            if coalesced > 1 {
                debug!("Coalesced {} saves of '{}' into one write", coalesced, self.key);
            }
            self.write(data.as_ref()).await;
        }
    }
}

async fn run_writer<T: DocumentData>(
    writer: Writer,
    mut rx: mpsc::UnboundedReceiver<WriterCommand<T>>,
    debounce: Duration,
) {
    let mut pending: Option<Arc<T>> = None;
    let mut coalesced = 0usize;
    let mut deadline: Option<Instant> = None;

    loop {
        let next_deadline = deadline;
        let timer = async move {
            match next_deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            command = rx.recv() => match command {
                Some(WriterCommand::Save { data, immediate }) => {
                    pending = Some(data);
                    coalesced += 1;
                    if immediate {
                        deadline = None;
                        writer.write_pending(&mut pending, coalesced).await;
                        coalesced = 0;
                    } else {
                        deadline = Some(Instant::now() + debounce);
                    }
                }
                Some(WriterCommand::Flush(ack)) => {
                    deadline = None;
                    writer.write_pending(&mut pending, coalesced).await;
                    coalesced = 0;
                    let _ = ack.send(());
                }
                None => {
                    // Gateway dropped; don't lose the last save
                    writer.write_pending(&mut pending, coalesced).await;
                    break;
                }
            },
            _ = timer => {
                deadline = None;
                writer.write_pending(&mut pending, coalesced).await;
                coalesced = 0;
            }
        }
    }
}

fn decode_document<T: DeserializeOwned>(key: &str, raw: Value) -> Option<Document<T>> {
    match serde_json::from_value::<Document<T>>(raw) {
        Ok(document) => {
            if document.version > DOCUMENT_VERSION {
                warn!(
                    "'{}' was written with newer schema version {}, reading anyway",
                    key, document.version
                );
            }
            Some(document)
        }
        Err(e) => {
            warn!("Ignoring unreadable document under '{}': {}", key, e);
            None
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
