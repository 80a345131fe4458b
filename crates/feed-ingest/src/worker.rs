//! Background worker that drives the change feed: initial fetch, live
//! watches, event routing, and the outbound write queue.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::router::{Action, EventRouter, PoseSink};
use crate::store::DocumentStore;
use crate::throttle::{epoch_seconds, ChangeFeedThrottle};
use crate::types::{FeedDelta, FeedNotification, FeedUpdate, StreamKey};

/// Outbound writes queued while the worker is busy; the UI never blocks on
/// a slow store.
const WRITE_QUEUE_CAPACITY: usize = 256;

/// Poll timeout of the drain loop; bounds stop latency.
const DRAIN_POLL: Duration = Duration::from_millis(200);

/// Tuning for the feed worker.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub robots_limit: usize,
    pub tasks_limit: usize,
    pub events_limit: usize,
    pub interactions_limit: usize,
    /// Minimum seconds between streamed pose events per robot; 0 disables
    /// throttling.
    pub pose_emit_interval_s: f64,
    /// Minimum seconds between full-snapshot repaints per collection.
    pub snapshot_emit_interval_s: f64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            robots_limit: StreamKey::Robots.default_limit(),
            tasks_limit: StreamKey::Tasks.default_limit(),
            events_limit: StreamKey::Events.default_limit(),
            interactions_limit: StreamKey::Interactions.default_limit(),
            pose_emit_interval_s: 1.0,
            snapshot_emit_interval_s: 0.05,
        }
    }
}

impl FeedConfig {
    pub fn limit(&self, key: StreamKey) -> usize {
        match key {
            StreamKey::Robots => self.robots_limit,
            StreamKey::Tasks => self.tasks_limit,
            StreamKey::Events => self.events_limit,
            StreamKey::Interactions => self.interactions_limit,
        }
    }
}

/// One queued document write.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub collection: String,
    pub doc_id: String,
    pub data: Map<String, Value>,
}

/// Control surface of a running feed worker.
pub struct FeedWorkerHandle {
    running: Arc<AtomicBool>,
    writes: Sender<WriteRequest>,
    handle: JoinHandle<()>,
}

impl FeedWorkerHandle {
    /// Queue a document write without blocking. Returns false when the
    /// queue is full or the worker has exited; the caller decides whether
    /// to resubmit.
    pub fn enqueue_write(
        &self,
        collection: impl Into<String>,
        doc_id: impl Into<String>,
        data: Map<String, Value>,
    ) -> bool {
        self.writes
            .try_send(WriteRequest {
                collection: collection.into(),
                doc_id: doc_id.into(),
                data,
            })
            .is_ok()
    }

    /// Signal the worker to stop and wait until its watches are
    /// unsubscribed and the drain loop has exited.
    pub fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.handle.join();
    }
}

/// Spawn the feed worker on its own thread.
///
/// Updates are posted to `updates` without blocking; routed pose events are
/// additionally pushed to `pose_sink` when one is given.
pub fn spawn_feed_worker(
    store: Box<dyn DocumentStore>,
    config: FeedConfig,
    updates: Sender<FeedUpdate>,
    pose_sink: Option<Box<dyn PoseSink>>,
) -> FeedWorkerHandle {
    let running = Arc::new(AtomicBool::new(true));
    let (write_tx, write_rx) = bounded(WRITE_QUEUE_CAPACITY);

    let worker_running = running.clone();
    let handle = thread::spawn(move || {
        feed_loop(store, config, updates, pose_sink, write_rx, worker_running);
    });

    FeedWorkerHandle {
        running,
        writes: write_tx,
        handle,
    }
}

fn feed_loop(
    store: Box<dyn DocumentStore>,
    config: FeedConfig,
    updates: Sender<FeedUpdate>,
    mut pose_sink: Option<Box<dyn PoseSink>>,
    write_rx: Receiver<WriteRequest>,
    running: Arc<AtomicBool>,
) {
    debug!("feed worker started");

    let throttle = Arc::new(ChangeFeedThrottle::new());
    let router = EventRouter::new(
        throttle,
        config.pose_emit_interval_s,
        config.snapshot_emit_interval_s,
    );

    // Initial fetch: one unthrottled snapshot per collection. Failures are
    // per-collection and non-fatal.
    for key in StreamKey::ALL {
        match store.fetch_recent(key.collection(), key.order_fields(), config.limit(key)) {
            Ok(rows) => {
                debug!("initial fetch {}: {} docs", key.collection(), rows.len());
                let _ = updates.send(FeedUpdate::Snapshot { key, rows });
            }
            Err(err) => warn!("initial fetch {} failed: {err}", key.collection()),
        }
    }

    // notif_tx stays alive here so the receive side never disconnects while
    // the drain loop runs, even if every watch subscription failed.
    let (notif_tx, notif_rx) = unbounded();
    let mut watches = Vec::new();
    for key in StreamKey::ALL {
        match store.watch(key, config.limit(key), notif_tx.clone()) {
            Ok(watch) => watches.push(watch),
            Err(err) => warn!("failed to watch {}: {err}", key.collection()),
        }
    }

    while running.load(Ordering::Relaxed) {
        select! {
            recv(notif_rx) -> msg => match msg {
                Ok(Ok(notif)) => {
                    handle_notification(&router, &updates, &mut pose_sink, notif);
                }
                Ok(Err(err)) => {
                    // Listener-side failure: logged, the watch stays
                    // subscribed and keeps delivering.
                    error!("feed listener error: {err}");
                    metrics::counter!("feed_listener_errors_total").increment(1);
                }
                Err(_) => {}
            },
            recv(write_rx) -> req => match req {
                Ok(req) => perform_write(store.as_ref(), &updates, req),
                // Every handle is gone; nobody can stop or feed us.
                Err(_) => break,
            },
            default(DRAIN_POLL) => {}
        }
    }

    for watch in watches {
        debug!("unsubscribing {} watch", watch.key().collection());
        watch.unsubscribe();
    }
    drop(notif_tx);
    debug!("feed worker stopped");
}

fn handle_notification(
    router: &EventRouter,
    updates: &Sender<FeedUpdate>,
    pose_sink: &mut Option<Box<dyn PoseSink>>,
    notif: FeedNotification,
) {
    let now = epoch_seconds();
    let FeedNotification {
        key,
        snapshot,
        deltas,
    } = notif;

    if router.route_snapshot(key, now) == Action::Forward {
        let _ = updates.send(FeedUpdate::Snapshot {
            key,
            rows: snapshot,
        });
    }

    // Per-event streaming is wired for the events collection only; the
    // other collections repaint from their snapshots.
    if key != StreamKey::Events {
        return;
    }

    for delta in deltas {
        if let FeedDelta::Added(event) = delta {
            match router.route(&event, now) {
                Action::Forward => {
                    metrics::counter!("feed_events_total").increment(1);
                    if let Some(sink) = pose_sink.as_mut() {
                        if let Some(pose) = event.pose() {
                            sink.push_pose(event.robot_id(), pose);
                        }
                    }
                    let _ = updates.send(FeedUpdate::EventAdded(event));
                }
                Action::Suppress => {
                    metrics::counter!("feed_suppressed_total").increment(1);
                }
            }
        }
    }
}

fn perform_write(store: &dyn DocumentStore, updates: &Sender<FeedUpdate>, req: WriteRequest) {
    match store.write(&req.collection, &req.doc_id, &req.data) {
        Ok(()) => {
            metrics::counter!("feed_writes_total").increment(1);
            let _ = updates.send(FeedUpdate::WriteOk { doc_id: req.doc_id });
        }
        Err(err) => {
            metrics::counter!("feed_write_failures_total").increment(1);
            warn!("write {} failed: {err}", req.doc_id);
            let _ = updates.send(FeedUpdate::WriteFailed {
                doc_id: req.doc_id,
                error: err.to_string(),
            });
        }
    }
}
