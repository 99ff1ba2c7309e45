use std::cmp::Ordering;

use anyhow::Result;
use focal_utils::DetectionSettings;
use tract_onnx::prelude::{Tensor, tract_ndarray::ArrayView2};

use crate::model::ROW_LEN;

/// Score filtering and suppression parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PostprocessConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        DetectionSettings::default().into()
    }
}

impl From<DetectionSettings> for PostprocessConfig {
    fn from(settings: DetectionSettings) -> Self {
        (&settings).into()
    }
}

impl From<&DetectionSettings> for PostprocessConfig {
    fn from(settings: &DetectionSettings) -> Self {
        PostprocessConfig {
            score_threshold: settings.score_threshold,
            nms_threshold: settings.nms_threshold,
            top_k: settings.top_k,
        }
    }
}

/// Axis-aligned box in source image pixels, anchored at its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Center of the box as `(x, y)`.
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Intersection over union with `other`.
    pub fn iou(&self, other: &Self) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if intersection <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 { 0.0 } else { intersection / union }
    }
}

/// Facial landmark in source image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

/// One detected face.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Right eye, left eye, nose tip, right and left mouth corners.
    pub landmarks: [Landmark; 5],
    pub score: f32,
}

/// Turn raw model rows into detections in source image space.
///
/// Rows below the score threshold or with empty boxes are dropped, the rest
/// are scaled by `scale_x`/`scale_y`, sorted by descending score, truncated to
/// `top_k`, and passed through non-maximum suppression. The first element of
/// the result is therefore the most confident face.
pub fn apply_postprocess(
    output: &Tensor,
    scale_x: f32,
    scale_y: f32,
    config: &PostprocessConfig,
) -> Result<Vec<Detection>> {
    let rows = detection_rows(output)?;

    let mut detections: Vec<Detection> = rows
        .rows()
        .into_iter()
        .filter_map(|row| {
            let score = row[14];
            if !score.is_finite() || score < config.score_threshold {
                return None;
            }
            let bbox = BoundingBox {
                x: row[0] * scale_x,
                y: row[1] * scale_y,
                width: row[2] * scale_x,
                height: row[3] * scale_y,
            };
            if bbox.width <= 0.0 || bbox.height <= 0.0 {
                return None;
            }
            let landmarks = std::array::from_fn(|i| Landmark {
                x: row[4 + i * 2] * scale_x,
                y: row[5 + i * 2] * scale_y,
            });
            Some(Detection {
                bbox,
                landmarks,
                score,
            })
        })
        .collect();

    detections.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    if config.top_k > 0 {
        detections.truncate(config.top_k);
    }
    if config.nms_threshold > 0.0 && detections.len() > 1 {
        detections = non_max_suppression(detections, config.nms_threshold);
    }

    Ok(detections)
}

fn detection_rows(output: &Tensor) -> Result<ArrayView2<'_, f32>> {
    let rows = match output.shape() {
        [rows, ROW_LEN] | [1, rows, ROW_LEN] => *rows,
        other => anyhow::bail!(
            "YuNet output must have shape [N, {ROW_LEN}] or [1, N, {ROW_LEN}] (got {other:?})"
        ),
    };
    let slice = output
        .as_slice::<f32>()
        .map_err(|e| anyhow::anyhow!("YuNet output is not f32: {e}"))?;
    ArrayView2::from_shape((rows, ROW_LEN), slice)
        .map_err(|_| anyhow::anyhow!("YuNet output data is not contiguous"))
}

/// Greedy NMS over detections already sorted by descending score.
fn non_max_suppression(detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for detection in detections {
        if kept.iter().all(|k| detection.bbox.iou(&k.bbox) <= threshold) {
            kept.push(detection);
        }
    }
    kept
}
