//! Offline builder for the image manifest consumed by the site at render time.
//!
//! A run walks the asset root, reads each image's dimensions and format, finds
//! a face focal point for JPEG sources, and writes everything to one JSON file.

pub mod args;
/// Optional mtime/size cache between runs.
pub mod cache;
pub mod config;
/// Focus detection with a per-file time limit.
pub mod detect;
pub mod detector;
/// Header-only dimension and format reads.
pub mod dimensions;
pub mod error;
/// Manifest types and the atomic JSON writer.
pub mod manifest;
/// Run orchestration and the pipeline state machine.
pub mod pipeline;
/// Recursive asset discovery.
pub mod walker;

pub use error::ManifestError;
pub use manifest::{AssetPath, Manifest, ManifestEntry};
pub use pipeline::{ManifestPipeline, PipelineOptions, PipelineState, RunSummary};
