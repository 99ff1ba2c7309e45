//! Settings shared by the focal crates.
//!
//! The settings file is plain JSON. Every section is `#[serde(default)]`, so a
//! file only needs to list the values it overrides.

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

/// Extensions the walker picks up when the settings file does not list any.
pub const DEFAULT_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "gif"];

/// Default location of the YuNet model relative to the working directory.
pub const DEFAULT_MODEL_PATH: &str = "models/face_detection_yunet_2023mar_640.onnx";

/// Detection post-processing parameters, mirroring YuNet defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionSettings {
    /// Minimum confidence score for a detection to be considered valid.
    pub score_threshold: f32,
    /// IoU threshold for non-maximum suppression.
    pub nms_threshold: f32,
    /// The maximum number of detections kept before NMS.
    pub top_k: usize,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            score_threshold: 0.9,
            nms_threshold: 0.3,
            top_k: 5_000,
        }
    }
}

/// Resize filter preference used when scaling an image to the model input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeQuality {
    /// Triangle filter.
    #[default]
    Quality,
    /// Nearest filter.
    Speed,
}

impl fmt::Display for ResizeQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResizeQuality::Quality => "quality",
            ResizeQuality::Speed => "speed",
        })
    }
}

impl FromStr for ResizeQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quality" => Ok(ResizeQuality::Quality),
            "speed" => Ok(ResizeQuality::Speed),
            other => Err(format!(
                "invalid resize quality '{other}'; expected 'quality' or 'speed'"
            )),
        }
    }
}

/// Model input resolution in pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InputDimensions {
    pub width: u32,
    pub height: u32,
    pub resize_quality: ResizeQuality,
}

impl Default for InputDimensions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 640,
            resize_quality: ResizeQuality::Quality,
        }
    }
}

/// Where the manifest reads from and writes to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ManifestSettings {
    /// Directory scanned for images. Keys in the manifest are relative to it.
    pub asset_root: PathBuf,
    /// Destination of the JSON manifest. Overwritten on every run.
    pub output_path: PathBuf,
    /// Optional sidecar cache enabling mtime/size based reuse between runs.
    pub cache_path: Option<PathBuf>,
    /// Lowercase file extensions (without the dot) picked up by the walker.
    pub extensions: Vec<String>,
}

impl Default for ManifestSettings {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("public"),
            output_path: PathBuf::from("data/image-manifest.json"),
            cache_path: None,
            extensions: DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
        }
    }
}

impl ManifestSettings {
    /// Normalize the extension list: lowercase, no leading dot, no blanks or
    /// duplicates. An empty result falls back to the defaults.
    pub fn sanitize(&mut self) {
        let mut cleaned: Vec<String> = Vec::with_capacity(self.extensions.len());
        for ext in &self.extensions {
            let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
            if !ext.is_empty() && !cleaned.contains(&ext) {
                cleaned.push(ext);
            }
        }
        if cleaned.is_empty() {
            cleaned = DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect();
        }
        self.extensions = cleaned;
    }
}

/// Worker pool and per-file limits for the batch run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineSettings {
    /// Worker threads for reading and detection. `0` lets rayon pick.
    pub workers: usize,
    /// Seconds a single detection may take before it is abandoned. `0` disables.
    pub detection_timeout_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: 0,
            detection_timeout_secs: 30,
        }
    }
}

impl PipelineSettings {
    pub fn detection_timeout(&self) -> Option<Duration> {
        (self.detection_timeout_secs > 0).then(|| Duration::from_secs(self.detection_timeout_secs))
    }
}

/// Settings controlling optional runtime telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Whether telemetry timing logs are enabled.
    pub enabled: bool,
    /// Logging level for telemetry output (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "debug".to_string(),
        }
    }
}

impl TelemetrySettings {
    /// Resolve the configured level string into a `LevelFilter`.
    ///
    /// Unknown strings resolve to `Debug`.
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "warning" => LevelFilter::Warn,
            other => other.parse().unwrap_or(LevelFilter::Debug),
        }
    }
}

/// Everything the manifest builder can be configured with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Path to the YuNet ONNX model.
    pub model_path: Option<String>,
    pub input: InputDimensions,
    pub detection: DetectionSettings,
    pub manifest: ManifestSettings,
    pub pipeline: PipelineSettings,
    pub telemetry: TelemetrySettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            model_path: Some(DEFAULT_MODEL_PATH.into()),
            input: InputDimensions::default(),
            detection: DetectionSettings::default(),
            manifest: ManifestSettings::default(),
            pipeline: PipelineSettings::default(),
            telemetry: TelemetrySettings::default(),
        }
    }
}

impl AppSettings {
    /// Load settings from a JSON file.
    ///
    /// A missing `model_path` falls back to the default model location.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let mut settings: AppSettings = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))?;

        if settings.model_path.is_none() {
            settings.model_path = Some(DEFAULT_MODEL_PATH.into());
        }
        settings.manifest.sanitize();

        Ok(settings)
    }

    /// The model path with the default applied.
    pub fn model_path(&self) -> PathBuf {
        PathBuf::from(self.model_path.as_deref().unwrap_or(DEFAULT_MODEL_PATH))
    }
}

/// Returns the default settings location (`config/focal.json`).
pub fn default_settings_path() -> PathBuf {
    env::current_dir()
        .map(|dir| dir.join("config/focal.json"))
        .unwrap_or_else(|_| PathBuf::from("config/focal.json"))
}
