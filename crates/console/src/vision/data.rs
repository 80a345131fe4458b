//! Shared structs passed between pipeline stages and to consumers.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;

/// Raw frame pulled from a frame source.
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

/// Pixel layout of [`Frame::data`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    /// Interleaved 8-bit blue/green/red, the layout camera backends hand out.
    Bgr8,
}

/// Capture failures. `Open` is fatal to the pipeline run; any other error
/// costs one frame.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open frame source {uri:?}")]
    Open { uri: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Blocking frame producer. Implementations pace themselves (a camera blocks
/// at sensor rate, a synthetic source sleeps) and release device handles on
/// drop.
pub trait FrameSource: Send {
    /// Block until the next frame is available.
    fn next_frame(&mut self) -> Result<Frame, CaptureError>;
}

/// Detection reduced to what consumers render or serialize.
#[derive(Clone, Debug, Serialize)]
pub struct DetectionSummary {
    pub class: String,
    pub score: f32,
    /// Pixel corners as `[x1, y1, x2, y2]`.
    pub bbox: [f32; 4],
}

/// Annotated output of one pipeline cycle.
#[derive(Clone)]
pub struct FramePacket {
    pub jpeg: Vec<u8>,
    pub detections: Vec<DetectionSummary>,
    pub timestamp_ms: i64,
    pub frame_number: u64,
    pub fps: f32,
}

/// Single-slot frame sink; the writer replaces whatever is there, readers
/// clone the latest. A slow reader never backs up the pipeline.
pub type SharedFrame = Arc<Mutex<Option<FramePacket>>>;
