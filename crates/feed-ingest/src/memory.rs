//! In-memory [`DocumentStore`] used by tests and the demo subcommand.
//!
//! Writes become visible to watchers immediately, on the caller's thread,
//! which keeps timing deterministic in tests.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use crossbeam_channel::Sender;
use serde_json::{Map, Value};

use crate::store::{DocumentStore, StoreError, WatchHandle};
use crate::types::{ChangeEvent, FeedDelta, FeedNotification, StreamKey};

type Doc = Map<String, Value>;

struct Watcher {
    id: u64,
    key: StreamKey,
    limit: usize,
    tx: Sender<Result<FeedNotification, StoreError>>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, Doc>>,
    watchers: Vec<Watcher>,
    next_watcher_id: u64,
    fail_writes: bool,
}

/// Shared in-memory document store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail, to exercise failure reporting.
    pub fn fail_writes(&self, fail: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_writes = fail;
        }
    }

    /// Insert or replace a document and notify watchers of the stream.
    pub fn insert(&self, key: StreamKey, doc_id: &str, data: Doc) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(_) => return,
        };

        let added = inner
            .collections
            .entry(key.collection().to_string())
            .or_default()
            .insert(doc_id.to_string(), data.clone())
            .is_none();

        let event = ChangeEvent::new(doc_id, data);
        let delta = if added {
            FeedDelta::Added(event)
        } else {
            FeedDelta::Modified(event)
        };
        Self::notify(&inner, key, delta);
    }

    /// Remove a document and notify watchers of the stream.
    pub fn remove(&self, key: StreamKey, doc_id: &str) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(_) => return,
        };

        let removed = inner
            .collections
            .get_mut(key.collection())
            .and_then(|docs| docs.remove(doc_id))
            .is_some();
        if removed {
            Self::notify(&inner, key, FeedDelta::Removed(doc_id.to_string()));
        }
    }

    /// Deliver a listener-side failure to watchers of one stream.
    pub fn inject_listener_error(&self, key: StreamKey, reason: &str) {
        if let Ok(inner) = self.inner.lock() {
            for watcher in inner.watchers.iter().filter(|w| w.key == key) {
                let _ = watcher.tx.send(Err(StoreError::Listener {
                    collection: key.collection().to_string(),
                    reason: reason.to_string(),
                }));
            }
        }
    }

    /// Number of live watches across all streams.
    pub fn watcher_count(&self) -> usize {
        match self.inner.lock() {
            Ok(inner) => inner.watchers.len(),
            Err(_) => 0,
        }
    }

    /// Read one document back, mostly for assertions.
    pub fn document(&self, collection: &str, doc_id: &str) -> Option<Doc> {
        match self.inner.lock() {
            Ok(inner) => inner
                .collections
                .get(collection)
                .and_then(|docs| docs.get(doc_id))
                .cloned(),
            Err(_) => None,
        }
    }

    fn notify(inner: &Inner, key: StreamKey, delta: FeedDelta) {
        for watcher in inner.watchers.iter().filter(|w| w.key == key) {
            let notification = FeedNotification {
                key,
                snapshot: Self::rows(inner, key.collection(), key.order_fields(), watcher.limit),
                deltas: vec![delta.clone()],
            };
            let _ = watcher.tx.send(Ok(notification));
        }
    }

    fn rows(
        inner: &Inner,
        collection: &str,
        order_fields: &[&str],
        limit: usize,
    ) -> Vec<ChangeEvent> {
        let docs = match inner.collections.get(collection) {
            Some(docs) => docs,
            None => return Vec::new(),
        };

        let mut rows: Vec<ChangeEvent> = docs
            .iter()
            .map(|(id, data)| ChangeEvent::new(id.clone(), data.clone()))
            .collect();

        // Mirrors an indexed order_by: the first candidate field present in
        // any document wins; otherwise the read stays unordered.
        let field = order_fields
            .iter()
            .find(|f| rows.iter().any(|r| r.data.contains_key(**f)));
        if let Some(field) = field {
            rows.sort_by(|a, b| {
                let av = a
                    .data
                    .get(*field)
                    .and_then(Value::as_f64)
                    .unwrap_or(f64::NEG_INFINITY);
                let bv = b
                    .data
                    .get(*field)
                    .and_then(Value::as_f64)
                    .unwrap_or(f64::NEG_INFINITY);
                bv.partial_cmp(&av).unwrap_or(Ordering::Equal)
            });
        }

        rows.truncate(limit);
        rows
    }
}

impl DocumentStore for MemoryStore {
    fn fetch_recent(
        &self,
        collection: &str,
        order_fields: &[&str],
        limit: usize,
    ) -> Result<Vec<ChangeEvent>, StoreError> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| anyhow!("memory store poisoned"))?;
        Ok(Self::rows(&inner, collection, order_fields, limit))
    }

    fn watch(
        &self,
        key: StreamKey,
        limit: usize,
        tx: Sender<Result<FeedNotification, StoreError>>,
    ) -> Result<WatchHandle, StoreError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| anyhow!("memory store poisoned"))?;

        let id = inner.next_watcher_id;
        inner.next_watcher_id += 1;
        inner.watchers.push(Watcher { id, key, limit, tx });

        let registry = self.inner.clone();
        Ok(WatchHandle::new(key, move || {
            if let Ok(mut inner) = registry.lock() {
                inner.watchers.retain(|w| w.id != id);
            }
        }))
    }

    fn write(&self, collection: &str, doc_id: &str, data: &Doc) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| anyhow!("memory store poisoned"))?;

        if inner.fail_writes {
            return Err(StoreError::Write {
                collection: collection.to_string(),
                doc_id: doc_id.to_string(),
                reason: "write failure injected".to_string(),
            });
        }

        let added = inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(doc_id.to_string(), data.clone())
            .is_none();

        if let Some(key) = StreamKey::ALL.into_iter().find(|k| k.collection() == collection) {
            let event = ChangeEvent::new(doc_id, data.clone());
            let delta = if added {
                FeedDelta::Added(event)
            } else {
                FeedDelta::Modified(event)
            };
            Self::notify(&inner, key, delta);
        }

        Ok(())
    }
}
