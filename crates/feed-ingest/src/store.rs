//! Seam between the feed worker and the document-store network client.

use crossbeam_channel::Sender;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{ChangeEvent, FeedNotification, StreamKey};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write {doc_id:?} to {collection:?}: {reason}")]
    Write {
        collection: String,
        doc_id: String,
        reason: String,
    },
    #[error("listener for {collection:?} failed: {reason}")]
    Listener {
        collection: String,
        reason: String,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Black-box change-feed source and write sink.
///
/// Implementations deliver watch notifications from their own threads over
/// the channel handed to [`DocumentStore::watch`]; listener-side failures
/// travel the same channel as `Err` without tearing the watch down.
pub trait DocumentStore: Send {
    /// Fetch up to `limit` most-recent documents, trying each order-field
    /// candidate in turn and falling back to an unordered read when none is
    /// indexed.
    fn fetch_recent(
        &self,
        collection: &str,
        order_fields: &[&str],
        limit: usize,
    ) -> Result<Vec<ChangeEvent>, StoreError>;

    /// Subscribe to live changes on one stream.
    fn watch(
        &self,
        key: StreamKey,
        limit: usize,
        tx: Sender<Result<FeedNotification, StoreError>>,
    ) -> Result<WatchHandle, StoreError>;

    /// Write one document, replacing any existing content under `doc_id`.
    fn write(
        &self,
        collection: &str,
        doc_id: &str,
        data: &Map<String, Value>,
    ) -> Result<(), StoreError>;
}

/// Live subscription returned by [`DocumentStore::watch`]. The watch stays
/// active until explicitly unsubscribed.
pub struct WatchHandle {
    key: StreamKey,
    stop: Box<dyn FnOnce() + Send>,
}

impl WatchHandle {
    pub fn new(key: StreamKey, stop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            key,
            stop: Box::new(stop),
        }
    }

    pub fn key(&self) -> StreamKey {
        self.key
    }

    /// Detach the watch; no further notifications are delivered.
    pub fn unsubscribe(self) {
        (self.stop)();
    }
}
