//! Demo wiring: synthetic camera, synthetic detector, in-memory store.
//!
//! Runs the full console loop with no hardware attached, which is also how
//! operators smoke-test a new install: frames flow through the detection
//! pipeline, a generator thread plays the robot fleet, and periodic control
//! commands exercise the audit trail.

use std::sync::{
    Arc, Mutex, Once,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::unbounded;
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

use feed_ingest::{
    FeedUpdate, MemoryStore, Pose, PoseSink, StreamKey, epoch_seconds, spawn_feed_worker,
};

use crate::command::{CommandGateway, ControlCommand, LoggingCommandBus};
use crate::config::ConsoleConfig;
use crate::telemetry;
use crate::vision::{
    SharedFrame, SyntheticEngine, SyntheticSource, VisionStatus, spawn_detection_pipeline,
};

/// Input geometry of the synthetic detector.
const DEMO_MODEL_SIZE: u32 = 320;
/// How often the demo dispatches a control command.
const COMMAND_INTERVAL: Duration = Duration::from_secs(5);
/// How often the latest preview packet is summarized in the log.
const PREVIEW_LOG_INTERVAL: Duration = Duration::from_secs(2);
/// Cadence of the fleet generator thread.
const GENERATOR_TICK: Duration = Duration::from_millis(200);

const DIRECTIONS: [&str; 4] = ["forward", "left", "back", "right"];

struct PoseLog;

impl PoseSink for PoseLog {
    fn push_pose(&mut self, robot_id: &str, pose: Pose) {
        debug!("Pose: {} at ({:.2}, {:.2})", robot_id, pose.x, pose.y);
    }
}

pub fn run(config: ConsoleConfig) -> Result<()> {
    telemetry::init_logging(config.verbose);
    telemetry::init_metrics(config.metrics_addr)?;

    static CTRL_HANDLER: Once = Once::new();
    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = shutdown.clone();
    CTRL_HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler({
            let handler_shutdown = handler_shutdown.clone();
            move || {
                handler_shutdown.store(true, Ordering::SeqCst);
            }
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });

    let store = MemoryStore::new();
    seed_store(&store, &config.robot_id);

    let (updates_tx, updates_rx) = unbounded();
    let feed = spawn_feed_worker(
        Box::new(store.clone()),
        config.feed_config(),
        updates_tx,
        Some(Box::new(PoseLog)),
    );

    let shared: SharedFrame = Arc::new(Mutex::new(None));
    let (status_tx, status_rx) = unbounded();
    let pipeline = spawn_detection_pipeline(
        Box::new(SyntheticSource::new(config.width, config.height)),
        Box::new(SyntheticEngine::new(DEMO_MODEL_SIZE, DEMO_MODEL_SIZE)),
        config.pipeline_options(),
        shared.clone(),
        status_tx,
    )?;

    let generator = spawn_fleet_generator(store.clone(), config.robot_id.clone(), shutdown.clone())
        .context("failed to spawn fleet generator thread")?;

    let mut gateway = CommandGateway::new(Box::new(LoggingCommandBus::new(true)), config.identity());

    info!(
        "Demo console running for {} ({}x{}); press Ctrl+C to stop",
        config.robot_id, config.width, config.height
    );

    let mut command_seq: usize = 0;
    let mut last_command = Instant::now();
    let mut last_preview = Instant::now();

    while !shutdown.load(Ordering::SeqCst) {
        while let Ok(update) = updates_rx.try_recv() {
            log_update(&update);
        }
        while let Ok(status) = status_rx.try_recv() {
            match status {
                VisionStatus::Heartbeat {
                    frame_number,
                    fps,
                    detections,
                } => debug!(
                    "Vision heartbeat: frame #{frame_number}, {fps:.1} fps, {detections} detections"
                ),
                VisionStatus::CaptureFailed { error } => {
                    error!("Vision source failed: {error}");
                    shutdown.store(true, Ordering::SeqCst);
                }
                VisionStatus::Stopped => debug!("Vision pipeline stopped"),
            }
        }

        if last_command.elapsed() >= COMMAND_INTERVAL {
            last_command = Instant::now();
            // Mostly drive commands, with a task request mixed in so both
            // audit shapes show up in the interactions stream.
            let outcome = if command_seq % 4 == 3 {
                let payload = json!({ "goal": "dock_1", "robot_id": config.robot_id });
                gateway.send_task("/task/request", &payload)
            } else {
                let direction = DIRECTIONS[command_seq % DIRECTIONS.len()];
                let command = ControlCommand {
                    robot_id: config.robot_id.clone(),
                    mode: "manual".to_string(),
                    direction: Some(direction.to_string()),
                    value: 1.0,
                    speed_percent: 40,
                };
                gateway.send_control(&command, "button")
            };
            command_seq += 1;
            if !feed.enqueue_write(
                StreamKey::Interactions.collection(),
                &outcome.interaction_id,
                outcome.record,
            ) {
                warn!("Audit queue full; dropping record {}", outcome.interaction_id);
            }
        }

        if last_preview.elapsed() >= PREVIEW_LOG_INTERVAL {
            last_preview = Instant::now();
            let packet = match shared.lock() {
                Ok(slot) => slot.clone(),
                Err(_) => None,
            };
            if let Some(packet) = packet {
                info!(
                    "Preview frame #{}: {} detections, {:.1} fps, {} JPEG bytes",
                    packet.frame_number,
                    packet.detections.len(),
                    packet.fps,
                    packet.jpeg.len()
                );
            }
        }

        thread::sleep(Duration::from_millis(100));
    }

    info!("Stopping demo console");
    shutdown.store(true, Ordering::SeqCst);
    pipeline.stop();
    feed.stop();
    let _ = generator.join();

    Ok(())
}

fn seed_store(store: &MemoryStore, robot_id: &str) {
    let mut robot = Map::new();
    robot.insert("robot_id".into(), json!(robot_id));
    robot.insert("status".into(), json!("idle"));
    robot.insert("battery".into(), json!(100));
    robot.insert("updated_at".into(), json!(epoch_seconds()));
    store.insert(StreamKey::Robots, robot_id, robot);

    let mut task = Map::new();
    task.insert("task_id".into(), json!("t_0001"));
    task.insert("robot_id".into(), json!(robot_id));
    task.insert("kind".into(), json!("patrol"));
    task.insert("status".into(), json!("queued"));
    task.insert("created_at".into(), json!(epoch_seconds()));
    store.insert(StreamKey::Tasks, "t_0001", task);
}

/// Background thread that plays the robot: a pose event every tick and a
/// status event every tenth one.
fn spawn_fleet_generator(
    store: MemoryStore,
    robot_id: String,
    running: Arc<AtomicBool>,
) -> std::io::Result<thread::JoinHandle<()>> {
    telemetry::spawn_thread("fleet-generator", move || {
        let mut tick: u64 = 0;
        while !running.load(Ordering::Relaxed) {
            tick = tick.wrapping_add(1);
            let phase = tick as f64 * 0.1;

            let mut pose = Map::new();
            pose.insert("x".into(), json!(5.0 + 3.0 * phase.cos()));
            pose.insert("y".into(), json!(5.0 + 3.0 * phase.sin()));
            pose.insert("yaw".into(), json!(phase % (2.0 * std::f64::consts::PI)));

            let mut doc = Map::new();
            doc.insert("robot_id".into(), json!(robot_id.as_str()));
            doc.insert("kind".into(), json!("pose_update"));
            doc.insert("pose".into(), Value::Object(pose));
            doc.insert("ts".into(), json!(epoch_seconds()));
            store.insert(StreamKey::Events, &format!("ev_{tick:06}"), doc);

            if tick % 10 == 0 {
                let mut status = Map::new();
                status.insert("robot_id".into(), json!(robot_id.as_str()));
                status.insert("kind".into(), json!("status"));
                status.insert("status".into(), json!("moving"));
                status.insert("battery".into(), json!(100_u64.saturating_sub(tick / 10)));
                status.insert("ts".into(), json!(epoch_seconds()));
                store.insert(StreamKey::Events, &format!("st_{tick:06}"), status);
            }

            thread::sleep(GENERATOR_TICK);
        }
    })
}

fn log_update(update: &FeedUpdate) {
    match update {
        FeedUpdate::Snapshot { key, rows } => {
            debug!("{} table refreshed ({} rows)", key.collection(), rows.len())
        }
        FeedUpdate::EventAdded(event) => {
            let kind = event
                .data
                .get("kind")
                .and_then(Value::as_str)
                .unwrap_or("event");
            info!("{} from {} ({})", kind, event.robot_id(), event.doc_id)
        }
        FeedUpdate::WriteOk { doc_id } => debug!("Audit write landed: {doc_id}"),
        FeedUpdate::WriteFailed { doc_id, error } => {
            warn!("Audit write failed for {doc_id}: {error}")
        }
    }
}
