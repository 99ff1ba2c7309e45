use std::{fmt, path::Path};

use anyhow::Result;

use crate::focus::{FocusPoint, select_focus};
use crate::model::YuNetModel;
use crate::postprocess::{Detection, PostprocessConfig, apply_postprocess};
use crate::preprocess::{PreprocessConfig, PreprocessOutput, preprocess_image};
use focal_utils::timing_guard;

/// Detections for one image plus the size they are expressed against.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionOutput {
    /// Sorted by descending score.
    pub detections: Vec<Detection>,
    /// Source image size as `(width, height)`.
    pub original_size: (u32, u32),
}

impl DetectionOutput {
    /// Focus point of the most confident face, or `None` when nothing was found.
    pub fn focus(&self) -> Option<FocusPoint> {
        let (width, height) = self.original_size;
        select_focus(&self.detections, width, height)
    }
}

/// A face detector the manifest pipeline can share between worker threads.
pub trait FaceDetector: Send + Sync + fmt::Debug {
    /// Detect faces in the image at `path`.
    fn detect_path(&self, path: &Path) -> Result<DetectionOutput>;

    /// Detect faces and reduce them to a single focal point.
    fn locate_focus(&self, path: &Path) -> Result<Option<FocusPoint>> {
        Ok(self.detect_path(path)?.focus())
    }
}

/// YuNet model bundled with its preprocessing and postprocessing settings.
#[derive(Debug)]
pub struct YuNetDetector {
    model: YuNetModel,
    preprocess: PreprocessConfig,
    postprocess: PostprocessConfig,
}

impl YuNetDetector {
    /// Load the model at `model_path`. This is the only expensive step; the
    /// detector is immutable afterwards.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        preprocess: PreprocessConfig,
        postprocess: PostprocessConfig,
    ) -> Result<Self> {
        let model = YuNetModel::load(model_path, preprocess.input_size)?;
        Ok(Self {
            model,
            preprocess,
            postprocess,
        })
    }

    fn run_preprocessed(&self, prep: PreprocessOutput) -> Result<DetectionOutput> {
        let raw = {
            let _guard = timing_guard("focal_core::onnx_inference", log::Level::Debug);
            self.model.run(prep.tensor)?
        };
        let detections = apply_postprocess(&raw, prep.scale_x, prep.scale_y, &self.postprocess)?;
        Ok(DetectionOutput {
            detections,
            original_size: prep.original_size,
        })
    }
}

impl FaceDetector for YuNetDetector {
    fn detect_path(&self, path: &Path) -> Result<DetectionOutput> {
        let _guard = timing_guard("focal_core::detect_path", log::Level::Debug);
        let prep = preprocess_image(path, &self.preprocess)?;
        self.run_preprocessed(prep)
    }
}
