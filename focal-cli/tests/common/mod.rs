//! Shared fixtures for the manifest integration tests.
#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::Result;
use focal_cli::PipelineOptions;
use focal_core::{BoundingBox, Detection, DetectionOutput, FaceDetector, Landmark};
use focal_utils::AppSettings;
use image::{ImageFormat, Rgb, RgbImage};

pub const MODEL_REL_PATH: &str = "../models/face_detection_yunet_2023mar_640.onnx";

pub fn find_model_path() -> Option<PathBuf> {
    let candidates = [
        "models/face_detection_yunet_2023mar_640.onnx",
        MODEL_REL_PATH,
    ];
    candidates
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

/// Deterministic detector keyed by file name.
#[derive(Debug, Default)]
pub struct StubDetector {
    faces: HashMap<String, DetectionOutput>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl StubDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// One face of `size` pixels centred on `(cx, cy)` in a `width` x `height` image.
    pub fn with_face(
        mut self,
        name: &str,
        (width, height): (u32, u32),
        (cx, cy): (f32, f32),
        size: f32,
    ) -> Self {
        let half = size / 2.0;
        let detection = Detection {
            bbox: BoundingBox {
                x: cx - half,
                y: cy - half,
                width: size,
                height: size,
            },
            landmarks: [Landmark { x: cx, y: cy }; 5],
            score: 0.97,
        };
        self.faces.insert(
            name.to_string(),
            DetectionOutput {
                detections: vec![detection],
                original_size: (width, height),
            },
        );
        self
    }

    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most detector calls that were running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Hand the pipeline a trait object while the test keeps the concrete stub.
pub fn shared(stub: &Arc<StubDetector>) -> Arc<dyn FaceDetector> {
    Arc::clone(stub) as Arc<dyn FaceDetector>
}

impl FaceDetector for StubDetector {
    fn detect_path(&self, path: &Path) -> Result<DetectionOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.failing.contains(&name) {
            anyhow::bail!("inference failed for {name}");
        }
        let (width, height) = image::image_dimensions(path)?;
        Ok(self.faces.get(&name).cloned().unwrap_or(DetectionOutput {
            detections: Vec::new(),
            original_size: (width, height),
        }))
    }
}

/// Save a flat-colour image; the format follows the file extension.
pub fn write_image(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture dir");
    }
    RgbImage::from_pixel(width, height, Rgb([180, 140, 120]))
        .save(path)
        .expect("save fixture image");
}

pub fn write_image_as(path: &Path, width: u32, height: u32, format: ImageFormat) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture dir");
    }
    RgbImage::from_pixel(width, height, Rgb([90, 90, 90]))
        .save_with_format(path, format)
        .expect("save fixture image");
}

/// `a.jpg` with a face, `b.png`, `c.jpg` without a face, and a corrupt `d.jpg`.
pub fn reference_tree(root: &Path) {
    write_image(&root.join("a.jpg"), 1000, 1000);
    write_image(&root.join("b.png"), 800, 600);
    write_image(&root.join("c.jpg"), 640, 480);
    fs::write(root.join("d.jpg"), b"\xFF\xD8\xFF\xE0 definitely not a jpeg").expect("write d.jpg");
}

pub fn reference_detector() -> StubDetector {
    StubDetector::new().with_face("a.jpg", (1000, 1000), (500.0, 250.0), 120.0)
}

/// Save a valid image, then cut it down to its first `keep` bytes.
pub fn write_truncated(path: &Path, width: u32, height: u32, keep: usize) {
    write_image(path, width, height);
    let bytes = fs::read(path).expect("read fixture");
    fs::write(path, &bytes[..keep.min(bytes.len())]).expect("truncate fixture");
}

/// Options for a run over `root` writing to `output`, without a timeout.
pub fn options_for(root: &Path, output: &Path) -> PipelineOptions {
    let mut settings = AppSettings::default();
    settings.manifest.asset_root = root.to_path_buf();
    settings.manifest.output_path = output.to_path_buf();
    settings.pipeline.workers = 2;
    settings.pipeline.detection_timeout_secs = 0;
    PipelineOptions::from_settings(&settings).expect("resolve options")
}
