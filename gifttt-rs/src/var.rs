//! The variable store.
//!
//! Single source of truth for variable state: an in-memory cache in front of
//! a durable [`Backend`], plus change notification.  A write whose value is
//! representation-equal to the current one is dropped; any other write
//! updates the cache, is handed to the [`ChangeQueue`] consumer (the caller
//! waits until the consumer has taken it) and is then written through.
//!
//! Writers are serialized from the compare through the write-through, so the
//! backend always ends up holding the value the cache holds.  A failed
//! write-through puts the previous cache entry back.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, Mutex as WriteLock};
use tracing::{debug, trace, warn};

use crate::error::StoreError;
use crate::script::Value;
use crate::store::{var_key, Backend, Record};

/// A variable took a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub name: String,
    pub value: serde_json::Value,
}

struct Handoff {
    change: Change,
    accepted: oneshot::Sender<()>,
}

/// Receiving end of the change notifications.  There is exactly one.
pub struct ChangeQueue {
    rx: mpsc::Receiver<Handoff>,
}

impl ChangeQueue {
    /// Wait for the next change and release the writer that produced it.
    /// `None` once every [`VarStore`] is gone.
    pub async fn recv(&mut self) -> Option<Change> {
        let handoff = self.rx.recv().await?;
        let _ = handoff.accepted.send(());
        Some(handoff.change)
    }
}

/// A write that passed change detection and still has to be announced and
/// persisted.
struct Pending {
    key: String,
    record: String,
    change: Change,
    previous: Option<serde_json::Value>,
}

pub struct VarStore {
    cache: Mutex<HashMap<String, serde_json::Value>>,
    /// Held by a writer from `stage` until the backend write returns.
    writer: WriteLock<()>,
    backend: Arc<dyn Backend>,
    events: mpsc::Sender<Handoff>,
}

impl VarStore {
    pub fn new(backend: Arc<dyn Backend>) -> (Self, ChangeQueue) {
        // Capacity 1 plus the acknowledgement makes every handoff a
        // rendezvous with the consumer.
        let (events, rx) = mpsc::channel(1);
        let store = Self {
            cache: Mutex::new(HashMap::new()),
            writer: WriteLock::new(()),
            backend,
            events,
        };
        (store, ChangeQueue { rx })
    }

    /// Stored value of `name`, or `None` if it was never written.
    pub fn lookup(&self, name: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let mut cache = self.cache.lock();
        self.current(&mut cache, name)
    }

    /// Runtime value of `name`; never-written variables read as nil.
    pub fn get(&self, name: &str) -> Result<Value, StoreError> {
        Ok(self
            .lookup(name)?
            .map(|json| Value::from_json(&json))
            .unwrap_or_default())
    }

    /// Cached value, falling back to the backend.  Backend hits are cached.
    fn current(
        &self,
        cache: &mut HashMap<String, serde_json::Value>,
        name: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        if let Some(v) = cache.get(name) {
            return Ok(Some(v.clone()));
        }
        let Some(raw) = self.backend.get(&var_key(name))? else {
            return Ok(None);
        };
        let record: Record = serde_json::from_str(&raw)?;
        cache.insert(name.to_owned(), record.value.clone());
        Ok(Some(record.value))
    }

    /// Compare and update the cache under one lock.  `None` means the value
    /// is unchanged.
    fn stage(&self, name: &str, value: serde_json::Value) -> Result<Option<Pending>, StoreError> {
        let mut cache = self.cache.lock();
        let previous = self.current(&mut cache, name)?;
        if previous.as_ref() == Some(&value) {
            trace!(var = name, "unchanged, write suppressed");
            return Ok(None);
        }
        let record = serde_json::to_string(&Record { value: value.clone() })?;
        cache.insert(name.to_owned(), value.clone());
        Ok(Some(Pending {
            key: var_key(name),
            record,
            change: Change { name: name.to_owned(), value },
            previous,
        }))
    }

    /// Write `record` through to the backend.  On failure the cache entry of
    /// `name` goes back to `previous`.
    fn persist(
        &self,
        name: &str,
        key: &str,
        record: &str,
        previous: Option<serde_json::Value>,
    ) -> Result<(), StoreError> {
        let Err(e) = self.backend.set(key, record) else {
            return Ok(());
        };
        warn!(var = name, error = %e, "write-through failed, cache entry restored");
        let mut cache = self.cache.lock();
        match previous {
            Some(old) => cache.insert(name.to_owned(), old),
            None => cache.remove(name),
        };
        Err(e)
    }

    fn handoff(change: Change) -> (Handoff, oneshot::Receiver<()>) {
        let (accepted, rx) = oneshot::channel();
        (Handoff { change, accepted }, rx)
    }

    /// Set `name` to `value`.  Returns whether the value changed.
    ///
    /// Waits for earlier writers to finish, then until the change consumer
    /// has taken the notification.  When no consumer exists any more the
    /// write is still persisted.
    pub async fn set(&self, name: &str, value: serde_json::Value) -> Result<bool, StoreError> {
        let _writer = self.writer.lock().await;
        let Some(Pending { key, record, change, previous }) = self.stage(name, value)? else {
            return Ok(false);
        };
        let (handoff, accepted) = Self::handoff(change);
        if self.events.send(handoff).await.is_err() || accepted.await.is_err() {
            debug!(var = name, "no change consumer, notification dropped");
        }
        self.persist(name, &key, &record, previous)?;
        Ok(true)
    }

    /// Blocking variant of [`VarStore::set`] for synchronous callers (rule
    /// evaluation).  Must not be called from inside an async task.
    pub fn set_blocking(&self, name: &str, value: serde_json::Value) -> Result<bool, StoreError> {
        let _writer = self.writer.blocking_lock();
        let Some(Pending { key, record, change, previous }) = self.stage(name, value)? else {
            return Ok(false);
        };
        let (handoff, accepted) = Self::handoff(change);
        if self.events.blocking_send(handoff).is_err() || accepted.blocking_recv().is_err() {
            debug!(var = name, "no change consumer, notification dropped");
        }
        self.persist(name, &key, &record, previous)?;
        Ok(true)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
