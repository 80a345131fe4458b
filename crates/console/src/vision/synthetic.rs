//! Self-contained frame source and inference engine: a drifting gradient
//! for frames, an orbiting box for detections. Used by the demo wiring and
//! by tests that need the full pipeline without hardware.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use detect_core::{InferenceEngine, ModelInput, ModelSpec, RawOutput};
use ndarray::arr2;

use crate::vision::data::{CaptureError, Frame, FrameFormat, FrameSource};

/// Frame pacing of the synthetic camera, roughly 30 fps.
const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

pub struct SyntheticSource {
    width: u32,
    height: u32,
    interval: Duration,
    tick: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            interval: DEFAULT_FRAME_INTERVAL,
            tick: 0,
        }
    }

    /// Override pacing; tests run with near-zero intervals.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        thread::sleep(self.interval);
        self.tick = self.tick.wrapping_add(1);

        let mut data = vec![0u8; (self.width * self.height * 3) as usize];
        for y in 0..u64::from(self.height) {
            for x in 0..u64::from(self.width) {
                let idx = ((y * u64::from(self.width) + x) * 3) as usize;
                data[idx] = ((x + self.tick) % 256) as u8;
                data[idx + 1] = ((y + self.tick / 2) % 256) as u8;
                data[idx + 2] = 96;
            }
        }

        Ok(Frame {
            data,
            width: self.width,
            height: self.height,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        })
    }
}

/// Deterministic detector stand-in. Every call emits three anchor rows: a
/// confident box orbiting the frame center, a weaker box of another class
/// overlapping it, and one row below any sane confidence threshold.
pub struct SyntheticEngine {
    spec: ModelSpec,
    tick: u64,
}

impl SyntheticEngine {
    pub fn new(input_width: u32, input_height: u32) -> Self {
        Self {
            spec: ModelSpec {
                input_width,
                input_height,
                float_input: true,
            },
            tick: 0,
        }
    }
}

impl InferenceEngine for SyntheticEngine {
    fn spec(&self) -> ModelSpec {
        self.spec
    }

    fn infer(&mut self, _input: &ModelInput) -> Result<RawOutput> {
        self.tick = self.tick.wrapping_add(1);
        let phase = self.tick as f32 * 0.05;
        let cx = 0.5 + 0.2 * phase.cos();
        let cy = 0.5 + 0.2 * phase.sin();

        let rows = arr2(&[
            [cx, cy, 0.2, 0.2, 0.9, 0.1, 0.8],
            [cx, cy, 0.24, 0.24, 0.6, 0.7, 0.2],
            [0.5, 0.5, 0.1, 0.1, 0.05, 0.5, 0.5],
        ]);
        Ok(rows.into_dyn())
    }
}
