//! Common helpers shared across the focal crates.

/// Settings file model and defaults.
pub mod config;
/// Image loading, header and decode checks, resizing, and tensor layout conversion.
pub mod image_utils;
/// Instrumentation helpers for optional performance tracing.
pub mod telemetry;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::LevelFilter;

pub use config::{
    AppSettings, DetectionSettings, InputDimensions, ManifestSettings, PipelineSettings,
    ResizeQuality, TelemetrySettings, default_settings_path,
};
pub use image_utils::{
    ImageHeader, compute_resize_scales, load_image, probe_image, resize_image, rgb_to_bgr_chw,
    verify_decodes,
};
pub use telemetry::{
    TimingGuard, configure as configure_telemetry, telemetry_allows, telemetry_enabled,
    telemetry_level, timing_guard, timing_guard_if,
};

/// Log target used by [`telemetry`] guards.
pub const TELEMETRY_TARGET: &str = "focal::telemetry";

/// Initialize logging once for the CLI and test harnesses.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` applies. Telemetry
/// records are always let through the logger and gated by [`telemetry`]
/// settings instead.
pub fn init_logging(default_filter: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.filter_module(TELEMETRY_TARGET, LevelFilter::Trace);

    // A second call (tests, embedding) keeps the first logger.
    let _ = builder.try_init();
    Ok(())
}

/// Validate that a path exists and resolve it to an absolute path.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    anyhow::ensure!(path.exists(), "path does not exist: {}", path.display());
    path.canonicalize()
        .with_context(|| format!("failed to resolve {}", path.display()))
}

/// Resolve a path that may not exist yet (an output file) against the
/// current directory without touching the filesystem.
pub fn absolutize<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    Ok(cwd.join(path))
}
