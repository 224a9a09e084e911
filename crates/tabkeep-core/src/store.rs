//! Document stores
//!
//! A `DocumentStore` holds the current value of one document as an
//! `Arc<T>`. Mutations clone the value, change the clone and publish the new
//! `Arc`, so readers holding an older snapshot are never affected and
//! observers can detect changes with `Arc::ptr_eq`.
//!
//! ## Lifecycle
//!
//! ```ignore
//! let mut store = DocumentStore::new(gateway);   // default data, not initialized
//! store.init(|doc| repair(doc)).await;           // load -> repair -> subscribe
//! store.update(|doc| { doc.tabs.clear(); true }); // publishes and schedules a write
//! ```
//!
//! Before `init` completes, mutations only change memory.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::debug;

use crate::persistence::{DocumentData, PersistenceGateway, SaveOptions, Subscription};

type RemoteHook<T> = Box<dyn FnMut(&mut T) -> bool + Send>;

pub struct DocumentStore<T> {
    state: Arc<watch::Sender<Arc<T>>>,
    gateway: PersistenceGateway<T>,
    initialized: bool,
    subscription: Option<Subscription>,
    remote_hook: Arc<Mutex<Option<RemoteHook<T>>>>,
}

impl<T> DocumentStore<T>
where
    T: DocumentData + Clone + Default,
{
    /// Create an uninitialized store holding default data
    pub fn new(gateway: PersistenceGateway<T>) -> Self {
        let (state, _) = watch::channel(Arc::new(T::default()));
        Self {
            state: Arc::new(state),
            gateway,
            initialized: false,
            subscription: None,
            remote_hook: Arc::new(Mutex::new(None)),
        }
    }

    /// Run `hook` on every value written by another instance before it is
    /// published
    ///
    /// The hook returns whether it changed the value. A changed value is
    /// only held in memory; the next local write persists it.
    pub fn on_remote(&self, hook: impl FnMut(&mut T) -> bool + Send + 'static) {
        *self.remote_hook.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(hook));
    }

    /// Hydrate from storage and start persisting
    ///
    /// `repair` runs on loaded data and returns whether it changed anything;
    /// repaired data is written back. Absent or unreadable data leaves the
    /// default value in place. Calling `init` twice is a no-op.
    pub async fn init<R>(&mut self, repair: R)
    where
        R: FnOnce(&mut T) -> bool,
    {
        if self.initialized {
            return;
        }

        let mut repaired = None;
        match self.gateway.load().await {
            Some(loaded) => {
                let mut copy = (*loaded).clone();
                if repair(&mut copy) {
                    debug!("Repaired '{}' on load", self.gateway.key());
                    repaired = Some(Arc::new(copy));
                } else {
                    self.state.send_replace(loaded);
                }
            }
            None => debug!("No stored '{}', using defaults", self.gateway.key()),
        }

        let sink = Arc::clone(&self.state);
        let hook = Arc::clone(&self.remote_hook);
        let key = self.gateway.key().to_string();
        self.subscription = Some(self.gateway.subscribe(move |remote| {
            let mut slot = hook.lock().unwrap_or_else(|e| e.into_inner());
            let adopted = match slot.as_mut() {
                Some(adjust) => {
                    let mut copy = (*remote).clone();
                    if adjust(&mut copy) {
                        debug!("Adjusted remote '{}' on arrival", key);
                        Arc::new(copy)
                    } else {
                        remote
                    }
                }
                None => remote,
            };
            sink.send_replace(adopted);
        }));
        self.initialized = true;

        if let Some(data) = repaired {
            self.replace(data);
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Current value
    pub fn snapshot(&self) -> Arc<T> {
        Arc::clone(&self.state.borrow())
    }

    /// Observe every published value; drop the receiver to unsubscribe
    pub fn subscribe(&self) -> watch::Receiver<Arc<T>> {
        self.state.subscribe()
    }

    /// Publish `data` as the new value
    pub fn replace(&self, data: Arc<T>) {
        self.state.send_replace(Arc::clone(&data));
        if self.initialized {
            self.gateway.save(data, SaveOptions::default());
        }
    }

    /// Mutate a copy of the current value
    ///
    /// The closure returns whether it changed anything; unchanged copies are
    /// discarded so nothing is published or written.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut T) -> bool,
    {
        let mut next = (*self.snapshot()).clone();
        if !f(&mut next) {
            return false;
        }
        self.replace(Arc::new(next));
        true
    }

    /// Wait for pending writes
    pub async fn flush(&self) {
        self.gateway.flush().await;
    }

    pub fn key(&self) -> &str {
        self.gateway.key()
    }
}
