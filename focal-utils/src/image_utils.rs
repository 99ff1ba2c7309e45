use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage, imageops::FilterType};
use ndarray::Array3;

/// Format and pixel size read from an image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

/// Load an image from disk into memory.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path_ref = path.as_ref();
    image::open(path_ref).with_context(|| format!("failed to open image {}", path_ref.display()))
}

/// Read the format and dimensions of an image without decoding its pixels.
///
/// The format is guessed from the file contents, not the extension, so a PNG
/// saved as `.jpg` reports `ImageFormat::Png`.
pub fn probe_image<P: AsRef<Path>>(path: P) -> Result<ImageHeader> {
    let path_ref = path.as_ref();
    let reader = ImageReader::open(path_ref)
        .with_context(|| format!("failed to open {}", path_ref.display()))?
        .with_guessed_format()
        .with_context(|| format!("failed to read header of {}", path_ref.display()))?;
    let format = reader
        .format()
        .with_context(|| format!("unrecognized image format: {}", path_ref.display()))?;
    let (width, height) = reader
        .into_dimensions()
        .with_context(|| format!("failed to read dimensions of {}", path_ref.display()))?;
    anyhow::ensure!(
        width > 0 && height > 0,
        "image has zero dimensions: {}",
        path_ref.display()
    );
    Ok(ImageHeader {
        width,
        height,
        format,
    })
}

/// Decode the whole pixel stream of an image and discard it.
///
/// A header can parse cleanly while the body is truncated or corrupt; only a
/// full decode catches that.
pub fn verify_decodes<P: AsRef<Path>>(path: P) -> Result<()> {
    let path_ref = path.as_ref();
    ImageReader::open(path_ref)
        .with_context(|| format!("failed to open {}", path_ref.display()))?
        .with_guessed_format()
        .with_context(|| format!("failed to read header of {}", path_ref.display()))?
        .decode()
        .with_context(|| format!("failed to decode {}", path_ref.display()))?;
    Ok(())
}

/// Resize an image to the requested resolution using the provided filter.
pub fn resize_image(image: &DynamicImage, width: u32, height: u32, filter: FilterType) -> RgbImage {
    image.resize_exact(width, height, filter).to_rgb8()
}

/// Convert an RGB image into a BGR CHW array, the layout OpenCV's
/// `blobFromImage` produces and YuNet expects.
pub fn rgb_to_bgr_chw(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut array = Array3::<f32>::zeros((3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        let (xi, yi) = (x as usize, y as usize);
        for (channel, value) in pixel.0.iter().rev().enumerate() {
            array[(channel, yi, xi)] = *value as f32;
        }
    }
    array
}

/// Scale factors that map model-space coordinates back to the source image.
pub fn compute_resize_scales(original: (u32, u32), target: (u32, u32)) -> Result<(f32, f32)> {
    let (orig_w, orig_h) = original;
    let (target_w, target_h) = target;
    anyhow::ensure!(
        target_w > 0 && target_h > 0,
        "target dimensions must be non-zero"
    );
    anyhow::ensure!(
        orig_w > 0 && orig_h > 0,
        "original dimensions must be non-zero"
    );
    Ok((
        orig_w as f32 / target_w as f32,
        orig_h as f32 / target_h as f32,
    ))
}
