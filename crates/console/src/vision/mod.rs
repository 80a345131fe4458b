//! Camera-to-preview detection pipeline.
//!
//! Split into focused submodules:
//! - `pipeline`: the capture → infer → decode → suppress → annotate loop.
//! - `annotation`: drawing primitives and JPEG encoding.
//! - `data`: shared structs passed between stages and to consumers.
//! - `synthetic`: self-contained source/engine pair for demos and tests.

pub use data::{
    CaptureError, DetectionSummary, Frame, FrameFormat, FramePacket, FrameSource, SharedFrame,
};
pub use pipeline::{PipelineHandle, PipelineOptions, VisionStatus, spawn_detection_pipeline};
pub use synthetic::{SyntheticEngine, SyntheticSource};

mod annotation;
pub mod data;
mod pipeline;
pub mod synthetic;
