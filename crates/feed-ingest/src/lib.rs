//! Live document-feed ingestion for the AGV operator console.
//!
//! A background worker pulls an initial snapshot per collection, subscribes
//! to live change feeds, routes incoming events through a per-robot pose
//! throttle, and drains an outbound write queue for audit records. The
//! document store itself is a seam ([`store::DocumentStore`]); an in-memory
//! implementation backs tests and demos.

pub mod interaction;
pub mod memory;
pub mod router;
pub mod store;
pub mod throttle;
pub mod types;
pub mod worker;

pub use interaction::{InteractionLogger, OperatorIdentity};
pub use memory::MemoryStore;
pub use router::{Action, EventRouter, PoseSink};
pub use store::{DocumentStore, StoreError, WatchHandle};
pub use throttle::{epoch_seconds, ChangeFeedThrottle};
pub use types::{ChangeEvent, FeedDelta, FeedNotification, FeedUpdate, Pose, StreamKey};
pub use worker::{spawn_feed_worker, FeedConfig, FeedWorkerHandle, WriteRequest};
