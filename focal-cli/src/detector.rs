//! YuNet detector construction.

use std::sync::Arc;

use anyhow::Result;
use focal_core::{FaceDetector, PostprocessConfig, PreprocessConfig, YuNetDetector};
use focal_utils::AppSettings;
use log::info;

/// Load the YuNet model named by `settings` into a shareable detector.
pub fn load_yunet(settings: &AppSettings) -> Result<Arc<dyn FaceDetector>> {
    let model_path = settings.model_path();
    let preprocess: PreprocessConfig = settings.input.into();
    let postprocess: PostprocessConfig = (&settings.detection).into();
    let input_size = preprocess.input_size;

    info!(
        "Loading YuNet model from {} at resolution {}x{}",
        model_path.display(),
        input_size.width,
        input_size.height
    );
    let detector = YuNetDetector::new(&model_path, preprocess, postprocess)?;
    Ok(Arc::new(detector))
}
