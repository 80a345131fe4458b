//! Configuration parsing for the operator console.
//!
//! CLI flags are translated once into a `ConsoleConfig` that downstream
//! components consume without re-parsing.

use std::net::SocketAddr;

use anyhow::{Result, bail};
use clap::Args;
use detect_core::LabelMap;
use feed_ingest::{FeedConfig, OperatorIdentity};

use crate::vision::PipelineOptions;

/// Default detection class names, index-aligned with the demo model.
const DEFAULT_LABELS: [&str; 5] = ["person", "agv", "pallet", "forklift", "cone"];

/// Canonical settings shared by the vision pipeline, the feed worker, and
/// the command gateway.
#[derive(Clone, Debug)]
pub struct ConsoleConfig {
    pub robot_id: String,
    pub width: u32,
    pub height: u32,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub class_agnostic: bool,
    pub draw_boxes: bool,
    pub draw_labels: bool,
    pub jpeg_quality: i32,
    pub pose_interval_s: f64,
    pub snapshot_interval_s: f64,
    pub operator_source: String,
    pub operator_user_id: String,
    pub metrics_addr: Option<SocketAddr>,
    pub verbose: bool,
}

/// CLI flags accepted by the `demo` subcommand.
#[derive(Debug, Args)]
pub struct ConsoleCliArgs {
    /// Robot targeted by console commands.
    #[arg(long = "robot", value_name = "ID", default_value = "agv1")]
    pub robot_id: String,
    /// Capture width in pixels.
    #[arg(long = "width", value_name = "PX", default_value_t = 640)]
    pub width: u32,
    /// Capture height in pixels.
    #[arg(long = "height", value_name = "PX", default_value_t = 480)]
    pub height: u32,
    /// Detection confidence threshold, 0 to 1.
    #[arg(long = "conf", value_name = "SCORE", default_value_t = 0.35)]
    pub conf_threshold: f32,
    /// Suppression overlap threshold, 0 to 1.
    #[arg(long = "iou", value_name = "RATIO", default_value_t = 0.45)]
    pub iou_threshold: f32,
    /// Suppress across classes instead of within each class.
    #[arg(long = "agnostic-nms", action = clap::ArgAction::SetTrue)]
    pub class_agnostic: bool,
    /// Skip drawing detection boxes.
    #[arg(long = "no-boxes", action = clap::ArgAction::SetTrue)]
    pub no_boxes: bool,
    /// Skip drawing detection labels.
    #[arg(long = "no-labels", action = clap::ArgAction::SetTrue)]
    pub no_labels: bool,
    /// JPEG quality for preview packets (1-100).
    #[arg(long = "jpeg-quality", value_name = "QUALITY", default_value_t = 85)]
    pub jpeg_quality: i32,
    /// Minimum seconds between streamed pose events per robot; 0 disables
    /// throttling.
    #[arg(long = "pose-interval", value_name = "SECONDS", default_value_t = 1.0)]
    pub pose_interval_s: f64,
    /// Minimum seconds between table repaints per collection.
    #[arg(long = "snapshot-interval", value_name = "SECONDS", default_value_t = 0.05)]
    pub snapshot_interval_s: f64,
    /// Source tag stamped onto audit records.
    #[arg(long = "operator-source", value_name = "TAG", default_value = "hmi_console")]
    pub operator_source: String,
    /// Operator user id stamped onto audit records.
    #[arg(long = "operator", value_name = "USER_ID", default_value = "operator_01")]
    pub operator_user_id: String,
    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9898).
    #[arg(long = "metrics-addr", value_name = "ADDR")]
    pub metrics_addr: Option<SocketAddr>,
    /// Enable verbose logging.
    #[arg(long = "verbose", action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
}

impl TryFrom<ConsoleCliArgs> for ConsoleConfig {
    type Error = anyhow::Error;

    fn try_from(args: ConsoleCliArgs) -> Result<Self> {
        if args.width == 0 || args.height == 0 {
            bail!("Capture width and height must be positive");
        }
        if !(0.0..=1.0).contains(&args.conf_threshold) {
            bail!("--conf must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&args.iou_threshold) {
            bail!("--iou must be within [0, 1]");
        }
        if !(1..=100).contains(&args.jpeg_quality) {
            bail!("--jpeg-quality must be an integer between 1 and 100");
        }
        if args.robot_id.is_empty() {
            bail!("--robot must not be empty");
        }

        Ok(Self {
            robot_id: args.robot_id,
            width: args.width,
            height: args.height,
            conf_threshold: args.conf_threshold,
            iou_threshold: args.iou_threshold,
            class_agnostic: args.class_agnostic,
            draw_boxes: !args.no_boxes,
            draw_labels: !args.no_labels,
            jpeg_quality: args.jpeg_quality,
            pose_interval_s: args.pose_interval_s,
            snapshot_interval_s: args.snapshot_interval_s,
            operator_source: args.operator_source,
            operator_user_id: args.operator_user_id,
            metrics_addr: args.metrics_addr,
            verbose: args.verbose,
        })
    }
}

impl ConsoleConfig {
    /// Vision pipeline settings derived from these flags.
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            conf_threshold: self.conf_threshold,
            iou_threshold: self.iou_threshold,
            class_agnostic: self.class_agnostic,
            draw_boxes: self.draw_boxes,
            draw_labels: self.draw_labels,
            jpeg_quality: self.jpeg_quality,
            labels: LabelMap::new(DEFAULT_LABELS.iter().map(|s| s.to_string()).collect()),
        }
    }

    /// Feed worker settings derived from these flags.
    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            pose_emit_interval_s: self.pose_interval_s,
            snapshot_emit_interval_s: self.snapshot_interval_s,
            ..FeedConfig::default()
        }
    }

    /// Identity stamped onto audit records written by this console.
    pub fn identity(&self) -> OperatorIdentity {
        OperatorIdentity {
            source: self.operator_source.clone(),
            user_id: self.operator_user_id.clone(),
            robot_id: self.robot_id.clone(),
        }
    }
}
