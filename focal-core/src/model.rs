use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, warn};
use tract_onnx::prelude::{
    Framework, Graph, InferenceModelExt, IntoTensor, SimplePlan, Tensor, TypedFact, TypedOp, tvec,
};

use crate::preprocess::InputSize;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

const STRIDES: [usize; 3] = [8, 16, 32];
const HEADS: usize = 4; // cls, obj, bbox, kps
/// Columns of one fused detection row: bbox (4) + landmarks (10) + score (1).
pub const ROW_LEN: usize = 15;

/// The YuNet graph, loaded once and run for every image.
///
/// Running the plan only needs `&self`, so one model can be shared between
/// worker threads.
#[derive(Debug)]
pub struct YuNetModel {
    runnable: RunnableModel,
    input_size: InputSize,
}

impl YuNetModel {
    /// Load the ONNX graph at `model_path`.
    ///
    /// The optimized plan is tried first; when tract cannot optimize the graph
    /// the decluttered plan is used instead.
    pub fn load<P: AsRef<Path>>(model_path: P, input_size: InputSize) -> Result<Self> {
        let path = model_path.as_ref();
        anyhow::ensure!(path.exists(), "model file not found: {}", path.display());

        let runnable = match build_plan(path, true) {
            Ok(plan) => plan,
            Err(opt_err) => {
                warn!(
                    "YuNet model {} could not be optimized ({opt_err:#}); using the decluttered graph",
                    path.display()
                );
                build_plan(path, false).with_context(|| {
                    format!("decluttered YuNet graph failed after optimize error: {opt_err}")
                })?
            }
        };
        debug!(
            "YuNet model {} ready ({}x{})",
            path.display(),
            input_size.width,
            input_size.height
        );

        Ok(Self {
            runnable,
            input_size,
        })
    }

    /// Run the model and return detections as an `[N, 15]` tensor of
    /// `[x, y, w, h, landmarks.., score]` rows in model input coordinates.
    pub fn run(&self, input: Tensor) -> Result<Tensor> {
        let outputs = self
            .runnable
            .run(tvec![input.into()])
            .map_err(|e| anyhow::anyhow!("YuNet execution failed: {e}"))?;

        let mut tensors: Vec<Tensor> = outputs.into_iter().map(|v| v.into_tensor()).collect();
        match tensors.len() {
            1 => tensors
                .pop()
                .ok_or_else(|| anyhow::anyhow!("YuNet model produced no outputs")),
            n if n == STRIDES.len() * HEADS => decode_stride_outputs(&tensors, self.input_size),
            other => anyhow::bail!(
                "unexpected number of YuNet outputs: expected 1 or {}, got {other}",
                STRIDES.len() * HEADS
            ),
        }
    }
}

fn build_plan(path: &Path, optimized: bool) -> Result<RunnableModel> {
    let model = tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("failed to parse ONNX graph from {}", path.display()))?;

    let typed = if optimized {
        model
            .into_optimized()
            .map_err(|e| anyhow::anyhow!("unable to optimize YuNet graph: {e}"))?
    } else {
        model
            .into_typed()
            .map_err(|e| anyhow::anyhow!("unable to type-check YuNet graph: {e}"))?
            .into_decluttered()
            .map_err(|e| anyhow::anyhow!("unable to declutter YuNet graph: {e}"))?
    };
    typed
        .into_runnable()
        .map_err(|e| anyhow::anyhow!("unable to make YuNet graph runnable: {e}"))
}

fn head_slice<'a>(outputs: &'a [Tensor], head: usize, stride_index: usize) -> Result<&'a [f32]> {
    const NAMES: [&str; HEADS] = ["cls", "obj", "bbox", "kps"];
    outputs[head * STRIDES.len() + stride_index]
        .as_slice::<f32>()
        .map_err(|e| anyhow::anyhow!("{} output not f32: {e}", NAMES[head]))
}

/// Fuse the twelve per-stride heads (cls, obj, bbox, kps for strides 8/16/32)
/// into a single `[N, 15]` tensor of decoded rows.
pub(crate) fn decode_stride_outputs(outputs: &[Tensor], input_size: InputSize) -> Result<Tensor> {
    anyhow::ensure!(
        outputs.len() == STRIDES.len() * HEADS,
        "YuNet decode expects {} tensors, got {}",
        STRIDES.len() * HEADS,
        outputs.len()
    );

    let pad_w = (input_size.width as usize).div_ceil(32) * 32;
    let pad_h = (input_size.height as usize).div_ceil(32) * 32;

    let mut fused = Vec::new();
    for (stride_index, &stride) in STRIDES.iter().enumerate() {
        let cols = pad_w / stride;
        let rows = pad_h / stride;
        let cells = cols * rows;

        let cls = head_slice(outputs, 0, stride_index)?;
        let obj = head_slice(outputs, 1, stride_index)?;
        let bbox = head_slice(outputs, 2, stride_index)?;
        let kps = head_slice(outputs, 3, stride_index)?;
        for (name, len, expected) in [
            ("cls", cls.len(), cells),
            ("obj", obj.len(), cells),
            ("bbox", bbox.len(), cells * 4),
            ("kps", kps.len(), cells * 10),
        ] {
            anyhow::ensure!(
                len == expected,
                "{name} length mismatch at stride {stride}: expected {expected}, got {len}"
            );
        }

        fused.reserve(cells * ROW_LEN);
        let s = stride as f32;
        for idx in 0..cells {
            let col = (idx % cols) as f32;
            let row = (idx / cols) as f32;

            let score = (cls[idx].clamp(0.0, 1.0) * obj[idx].clamp(0.0, 1.0)).sqrt();
            let b = &bbox[idx * 4..idx * 4 + 4];
            let cx = (col + b[0]) * s;
            let cy = (row + b[1]) * s;
            let w = b[2].exp() * s;
            let h = b[3].exp() * s;
            fused.extend_from_slice(&[cx - w / 2.0, cy - h / 2.0, w, h]);

            for lm in kps[idx * 10..idx * 10 + 10].chunks_exact(2) {
                fused.push((lm[0] + col) * s);
                fused.push((lm[1] + row) * s);
            }
            fused.push(if score.is_finite() { score } else { 0.0 });
        }
    }

    Tensor::from_shape(&[fused.len() / ROW_LEN, ROW_LEN], &fused)
        .map_err(|e| anyhow::anyhow!("failed to build fused YuNet tensor: {e}"))
}
