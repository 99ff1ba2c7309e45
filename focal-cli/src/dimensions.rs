//! Size and format of source images, checked against a full decode.

use std::path::Path;

use focal_utils::{probe_image, verify_decodes};
use image::ImageFormat;

use crate::error::ManifestError;

/// Size and format of one source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

impl ImageInfo {
    /// Normalized format tag written to the manifest.
    pub fn type_tag(&self) -> String {
        format_tag(self.format)
    }

    /// Only JPEG sources go through face detection.
    pub fn is_jpeg(&self) -> bool {
        self.format == ImageFormat::Jpeg
    }
}

/// Canonical tag for an image format: its lowercase name, e.g. `jpeg`,
/// `png`, `webp`, `gif`.
pub fn format_tag(format: ImageFormat) -> String {
    format!("{format:?}").to_ascii_lowercase()
}

/// Read width, height, and format of the image at `path`.
///
/// Size and format come from the header. The pixel data is decoded as well so
/// a truncated or corrupt body is a [`ManifestError::Decode`] rather than an
/// entry.
pub fn read_dimensions(path: &Path) -> Result<ImageInfo, ManifestError> {
    let header = probe_image(path).map_err(|err| ManifestError::decode(path, &err))?;
    verify_decodes(path).map_err(|err| ManifestError::decode(path, &err))?;
    Ok(ImageInfo {
        width: header.width,
        height: header.height,
        format: header.format,
    })
}
