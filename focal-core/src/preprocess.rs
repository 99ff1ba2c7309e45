//! Preparing images for YuNet inference.
//!
//! Images are resized to the model input, laid out as a `[1, 3, H, W]` BGR
//! tensor, and returned with the scale factors needed to map detections back
//! onto the source image.

use std::{borrow::Cow, path::Path};

use anyhow::{Context, Result};
use focal_utils::{
    InputDimensions, ResizeQuality, compute_resize_scales, load_image, resize_image,
    rgb_to_bgr_chw, timing_guard,
};
use image::{DynamicImage, GenericImageView, RgbImage, imageops::FilterType};
use tract_onnx::prelude::Tensor;

/// Model input resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSize {
    pub width: u32,
    pub height: u32,
}

impl InputSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for InputSize {
    fn default() -> Self {
        Self::new(640, 640)
    }
}

/// Configuration for preprocessing an image before inference.
#[derive(Debug, Clone, Default)]
pub struct PreprocessConfig {
    pub input_size: InputSize,
    pub resize_quality: ResizeQuality,
}

impl PreprocessConfig {
    fn resize_filter(&self) -> FilterType {
        match self.resize_quality {
            ResizeQuality::Quality => FilterType::Triangle,
            ResizeQuality::Speed => FilterType::Nearest,
        }
    }
}

impl From<InputDimensions> for PreprocessConfig {
    fn from(dimensions: InputDimensions) -> Self {
        PreprocessConfig {
            input_size: InputSize::new(dimensions.width, dimensions.height),
            resize_quality: dimensions.resize_quality,
        }
    }
}

/// Tensor plus the metadata needed to rescale detections.
#[derive(Debug)]
pub struct PreprocessOutput {
    pub tensor: Tensor,
    pub scale_x: f32,
    pub scale_y: f32,
    /// Source image size as `(width, height)`.
    pub original_size: (u32, u32),
}

/// Load an image file and preprocess it.
pub fn preprocess_image<P: AsRef<Path>>(
    path: P,
    config: &PreprocessConfig,
) -> Result<PreprocessOutput> {
    let path = path.as_ref();
    let image =
        load_image(path).with_context(|| format!("failed to load image {}", path.display()))?;
    preprocess_dynamic_image(&image, config)
}

/// Preprocess an image that is already in memory.
pub fn preprocess_dynamic_image(
    image: &DynamicImage,
    config: &PreprocessConfig,
) -> Result<PreprocessOutput> {
    let _guard = timing_guard("focal_core::preprocess", log::Level::Trace);
    let InputSize {
        width: input_w,
        height: input_h,
    } = config.input_size;
    anyhow::ensure!(
        input_w > 0 && input_h > 0,
        "input dimensions must be greater than zero"
    );

    let (orig_w, orig_h) = image.dimensions();
    let (scale_x, scale_y) = compute_resize_scales((orig_w, orig_h), (input_w, input_h))?;

    let resized: Cow<'_, RgbImage> = match image.as_rgb8() {
        Some(rgb) if (orig_w, orig_h) == (input_w, input_h) => Cow::Borrowed(rgb),
        _ if (orig_w, orig_h) == (input_w, input_h) => Cow::Owned(image.to_rgb8()),
        _ => Cow::Owned(resize_image(
            image,
            input_w,
            input_h,
            config.resize_filter(),
        )),
    };

    let (data, _) = rgb_to_bgr_chw(&resized).into_raw_vec_and_offset();
    let tensor = Tensor::from_shape(&[1, 3, input_h as usize, input_w as usize], &data)
        .map_err(|e| anyhow::anyhow!("failed to build tensor: {e}"))?;

    Ok(PreprocessOutput {
        tensor,
        scale_x,
        scale_y,
        original_size: (orig_w, orig_h),
    })
}
