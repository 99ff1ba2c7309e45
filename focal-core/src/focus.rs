//! Focal points derived from face detections.

use serde::{Deserialize, Serialize};

use crate::postprocess::Detection;

const FOCUS_PRECISION: f64 = 10_000.0;

/// Center of the most prominent face as fractions of the image size.
///
/// Both coordinates lie in `[0, 1]` and carry at most four decimal digits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusPoint {
    pub x: f64,
    pub y: f64,
}

impl FocusPoint {
    /// Build a focus point from pixel coordinates inside a `width` x `height`
    /// image. Returns `None` for an empty image or non-finite coordinates.
    pub fn from_pixels(px: f64, py: f64, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 || !px.is_finite() || !py.is_finite() {
            return None;
        }
        Some(Self {
            x: normalize(px, width),
            y: normalize(py, height),
        })
    }

    /// Focus on the bounding-box center of `detection`.
    pub fn from_detection(detection: &Detection, width: u32, height: u32) -> Option<Self> {
        let bbox = &detection.bbox;
        let cx = f64::from(bbox.x) + f64::from(bbox.width) / 2.0;
        let cy = f64::from(bbox.y) + f64::from(bbox.height) / 2.0;
        Self::from_pixels(cx, cy, width, height)
    }
}

fn normalize(value: f64, extent: u32) -> f64 {
    let fraction = (value / f64::from(extent)).clamp(0.0, 1.0);
    (fraction * FOCUS_PRECISION).round() / FOCUS_PRECISION
}

/// Pick the focus of the highest-scoring detection, if any.
pub fn select_focus(detections: &[Detection], width: u32, height: u32) -> Option<FocusPoint> {
    detections
        .iter()
        .filter(|d| d.score.is_finite())
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .and_then(|best| FocusPoint::from_detection(best, width, height))
}
