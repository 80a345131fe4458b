use ndarray::ArrayD;
use serde::Serialize;
use thiserror::Error;

/// Raw model output as a dynamically shaped tensor.
///
/// Two layouts are understood by the decoder: anchor rows
/// `[cx, cy, w, h, obj, class_scores..]` and pre-filtered rows
/// `[x1, y1, x2, y2, score, class_id]`.
pub type RawOutput = ArrayD<f32>;

/// Single detection in frame-space pixel coordinates.
///
/// Ephemeral: produced per frame and discarded after annotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
    pub class_id: usize,
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32, class_id: usize) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            score,
            class_id,
        }
    }

    /// Box area, with degenerate (inverted or empty) boxes clamped to zero.
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }
}

/// Raised when a raw output tensor cannot be brought into row form.
///
/// Tensors that merely contain no detections decode to an empty list
/// instead of erroring.
#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("cannot reshape output of shape {shape:?} into rows of width {width}")]
    Reshape { shape: Vec<usize>, width: usize },
    #[error("output rows of width {width} are too narrow to describe a detection")]
    RowWidth { width: usize },
}
