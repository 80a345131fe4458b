//! Detection post-processing for the AGV operator console.
//!
//! The crate covers everything between a raw model output tensor and the
//! boxes drawn on screen: decoding ([`decode`]), duplicate removal
//! ([`suppress`]), label/color resolution ([`labels`]), and the seams the
//! vision pipeline uses to talk to a model runtime ([`model`]).

pub mod decode;
pub mod labels;
pub mod model;
pub mod suppress;
pub mod types;

pub use decode::{BoxDecoder, CoordSpace};
pub use labels::LabelMap;
pub use model::{InferenceEngine, ModelInput, ModelSpec};
pub use suppress::Suppressor;
pub use types::{Detection, RawOutput, ShapeError};
