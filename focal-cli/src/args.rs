//! Command-line argument definitions for focal-cli.

use clap::{ArgAction, Parser};
use focal_utils::ResizeQuality;
use std::path::PathBuf;

/// Build the image manifest: dimensions, format, and face focus for every
/// image under the asset root.
///
/// Every option is optional. Without flags the settings file at
/// `config/focal.json` is used when present, otherwise built-in defaults.
#[derive(Debug, Default, Parser)]
#[command(author, version, about)]
pub struct ManifestArgs {
    /// Optional settings JSON. Defaults to `config/focal.json` when present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory scanned for images (default: `public`).
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Where the manifest JSON is written (default: `data/image-manifest.json`).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Path to the YuNet ONNX model.
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Sidecar cache file; unchanged images are reused from it.
    #[arg(long, value_name = "PATH")]
    pub cache: Option<PathBuf>,

    /// Worker threads (0 = one per core, 1 = sequential).
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Seconds a single face detection may take (0 disables the limit).
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Override score threshold.
    #[arg(long)]
    pub score_threshold: Option<f32>,

    /// Override NMS threshold.
    #[arg(long)]
    pub nms_threshold: Option<f32>,

    /// Override top_k limit.
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Override input width (pixels).
    #[arg(long)]
    pub width: Option<u32>,

    /// Override input height (pixels).
    #[arg(long)]
    pub height: Option<u32>,

    /// Resize quality mode: `quality` (Triangle) or `speed` (fast Nearest).
    #[arg(long, value_name = "MODE")]
    pub resize_quality: Option<ResizeQuality>,

    /// Enable telemetry timing logs (defaults to settings file).
    #[arg(long, action = ArgAction::SetTrue)]
    pub telemetry: bool,

    /// Override telemetry logging level (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    pub telemetry_level: Option<String>,
}
