//! The capture → infer → decode → suppress → annotate loop.
//!
//! One worker thread owns the whole cycle. Per-frame failures (a dropped
//! capture read, inference, malformed output) skip the frame; failing to
//! open the source ends the run.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::Sender;
use detect_core::{BoxDecoder, InferenceEngine, LabelMap, ModelInput, ModelSpec, Suppressor};
use image::{
    ImageBuffer, Rgb,
    imageops::{self, FilterType},
};
use ndarray::Array4;
use tracing::{debug, error, warn};

use crate::telemetry;
use crate::vision::annotation::{self, AnnotationStyle};
use crate::vision::data::{CaptureError, Frame, FrameFormat, FrameSource, SharedFrame};

/// Heartbeat cadence for capture logging and status events.
const HEARTBEAT_FRAMES: u64 = 30;

/// Tunables for one pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub class_agnostic: bool,
    pub draw_boxes: bool,
    pub draw_labels: bool,
    pub jpeg_quality: i32,
    pub labels: LabelMap,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            conf_threshold: 0.35,
            iou_threshold: 0.45,
            class_agnostic: false,
            draw_boxes: true,
            draw_labels: true,
            jpeg_quality: 85,
            labels: LabelMap::default(),
        }
    }
}

/// Lifecycle notifications posted by the pipeline worker.
#[derive(Clone, Debug)]
pub enum VisionStatus {
    /// Periodic progress report with smoothed throughput.
    Heartbeat {
        frame_number: u64,
        fps: f32,
        detections: usize,
    },
    /// The frame source failed; the worker has exited.
    CaptureFailed { error: String },
    /// The worker exited, gracefully or not.
    Stopped,
}

/// Control surface of a running pipeline.
pub struct PipelineHandle {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl PipelineHandle {
    /// Request shutdown and wait for the worker to finish. The frame source
    /// is released when the worker drops it.
    pub fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.handle.join();
    }
}

/// Spawn the detection pipeline on its own thread.
///
/// Annotated packets land in `shared` (latest wins); lifecycle events go to
/// `status` without blocking.
pub fn spawn_detection_pipeline(
    mut source: Box<dyn FrameSource>,
    mut engine: Box<dyn InferenceEngine>,
    options: PipelineOptions,
    shared: SharedFrame,
    status: Sender<VisionStatus>,
) -> Result<PipelineHandle> {
    let running = Arc::new(AtomicBool::new(true));
    let loop_running = running.clone();
    let handle = telemetry::spawn_thread("detection-pipeline", move || {
        pipeline_loop(
            source.as_mut(),
            engine.as_mut(),
            &options,
            &shared,
            &status,
            &loop_running,
        );
        let _ = status.send(VisionStatus::Stopped);
    })
    .context("failed to spawn detection pipeline thread")?;

    Ok(PipelineHandle { running, handle })
}

fn pipeline_loop(
    source: &mut dyn FrameSource,
    engine: &mut dyn InferenceEngine,
    options: &PipelineOptions,
    shared: &SharedFrame,
    status: &Sender<VisionStatus>,
    running: &AtomicBool,
) {
    let decoder = BoxDecoder::new(options.conf_threshold);
    let suppressor = Suppressor::new(options.iou_threshold, options.class_agnostic);
    let spec = engine.spec();
    let style = AnnotationStyle {
        draw_boxes: options.draw_boxes,
        draw_labels: options.draw_labels,
        jpeg_quality: options.jpeg_quality,
    };

    let mut frame_number: u64 = 0;
    let mut smoothed_fps: f32 = 0.0;
    let mut last_instant = Instant::now();

    while running.load(Ordering::Relaxed) {
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(err @ CaptureError::Open { .. }) => {
                error!("Capture failed: {err}");
                let _ = status.send(VisionStatus::CaptureFailed {
                    error: err.to_string(),
                });
                break;
            }
            Err(err) => {
                warn!("Dropped frame: {err}");
                continue;
            }
        };

        let cycle_start = Instant::now();
        frame_number = frame_number.wrapping_add(1);

        let elapsed = cycle_start.duration_since(last_instant).as_secs_f32();
        last_instant = cycle_start;
        if elapsed > 0.0 {
            let instant = 1.0 / elapsed;
            smoothed_fps = if smoothed_fps == 0.0 {
                instant
            } else {
                0.9 * smoothed_fps + 0.1 * instant
            };
        }
        metrics::gauge!("vision_fps").set(smoothed_fps as f64);

        let input = match preprocess(&frame, &spec) {
            Ok(input) => input,
            Err(err) => {
                warn!("Skipping malformed frame #{frame_number}: {err:#}");
                continue;
            }
        };
        let raw = match engine.infer(&input) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("Inference failed on frame #{frame_number}: {err:#}");
                continue;
            }
        };
        let decoded = match decoder.decode(&raw, frame.width, frame.height) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!("Discarding undecodable output on frame #{frame_number}: {err}");
                continue;
            }
        };
        let detections = suppressor.suppress(decoded);

        metrics::counter!("vision_frames_total").increment(1);
        metrics::counter!("vision_detections_total").increment(detections.len() as u64);

        match annotation::annotate_frame(
            &frame,
            frame_number,
            smoothed_fps,
            &detections,
            &options.labels,
            &style,
        ) {
            Ok(packet) => {
                if let Ok(mut slot) = shared.lock() {
                    *slot = Some(packet);
                }
            }
            Err(err) => warn!("Annotation failed on frame #{frame_number}: {err:#}"),
        }

        metrics::histogram!("vision_cycle_seconds").record(cycle_start.elapsed().as_secs_f64());

        if frame_number % HEARTBEAT_FRAMES == 0 {
            debug!(
                "Capture heartbeat: frame #{}, {:.1} fps, {} detections",
                frame_number,
                smoothed_fps,
                detections.len()
            );
            let _ = status.send(VisionStatus::Heartbeat {
                frame_number,
                fps: smoothed_fps,
                detections: detections.len(),
            });
        }
    }
}

/// Resize to the model's input geometry, swap BGR to RGB, and pack NHWC.
fn preprocess(frame: &Frame, spec: &ModelSpec) -> Result<ModelInput> {
    let rgb = bgr_to_rgb_image(frame)?;
    let resized = imageops::resize(&rgb, spec.input_width, spec.input_height, FilterType::Triangle);
    let (height, width) = (spec.input_height as usize, spec.input_width as usize);

    if spec.float_input {
        let mut input = Array4::<f32>::zeros((1, height, width, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for (c, sample) in pixel.0.iter().enumerate() {
                input[[0, y as usize, x as usize, c]] = f32::from(*sample) / 255.0;
            }
        }
        Ok(ModelInput::Float(input))
    } else {
        let mut input = Array4::<u8>::zeros((1, height, width, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for (c, sample) in pixel.0.iter().enumerate() {
                input[[0, y as usize, x as usize, c]] = *sample;
            }
        }
        Ok(ModelInput::Quantized(input))
    }
}

fn bgr_to_rgb_image(frame: &Frame) -> Result<ImageBuffer<Rgb<u8>, Vec<u8>>> {
    let FrameFormat::Bgr8 = frame.format;
    let mut rgb = Vec::with_capacity(frame.data.len());
    for chunk in frame.data.chunks_exact(3) {
        rgb.extend_from_slice(&[chunk[2], chunk[1], chunk[0]]);
    }
    ImageBuffer::from_vec(frame.width, frame.height, rgb).ok_or_else(|| {
        anyhow!(
            "frame bytes do not match {}x{} BGR geometry",
            frame.width,
            frame.height
        )
    })
}
