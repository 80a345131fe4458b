//! Seams between the vision pipeline and the model runtime.

use anyhow::Result;
use ndarray::Array4;

use crate::types::RawOutput;

/// Input geometry and numeric expectations of a detection model.
#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    pub input_width: u32,
    pub input_height: u32,
    /// True when the model expects floating samples in `[0, 1]`; false keeps
    /// the raw integer samples.
    pub float_input: bool,
}

/// Preprocessed frame in NHWC layout, matching the model's input dtype.
pub enum ModelInput {
    Float(Array4<f32>),
    Quantized(Array4<u8>),
}

impl ModelInput {
    /// `(height, width)` of the carried tensor.
    pub fn dims(&self) -> (usize, usize) {
        let shape = match self {
            ModelInput::Float(arr) => arr.shape(),
            ModelInput::Quantized(arr) => arr.shape(),
        };
        (shape[1], shape[2])
    }
}

/// Black-box inference backend: one forward pass from a preprocessed frame
/// to a raw output tensor. Assumed synchronous and deterministic for fixed
/// weights.
pub trait InferenceEngine: Send {
    fn spec(&self) -> ModelSpec;

    fn infer(&mut self, input: &ModelInput) -> Result<RawOutput>;
}
