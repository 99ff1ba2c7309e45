//! YuNet face detection for the focal manifest builder.
//!
//! This crate loads the YuNet ONNX model with `tract-onnx`, prepares images
//! for it, decodes its output into scored face boxes, and reduces those boxes
//! to a normalized focal point.

/// High-level detector and the [`FaceDetector`] seam.
pub mod detector;
/// Normalized focal points.
pub mod focus;
/// ONNX model loading and execution.
pub mod model;
/// Score filtering and non-maximum suppression.
pub mod postprocess;
/// Resizing and tensor conversion.
pub mod preprocess;

pub use detector::{DetectionOutput, FaceDetector, YuNetDetector};
pub use focus::{FocusPoint, select_focus};
pub use model::YuNetModel;
pub use postprocess::{BoundingBox, Detection, Landmark, PostprocessConfig, apply_postprocess};
pub use preprocess::{
    InputSize, PreprocessConfig, PreprocessOutput, preprocess_dynamic_image, preprocess_image,
};

/// Returns the crate version for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
