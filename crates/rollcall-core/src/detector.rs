//! Single-stage face detector via ONNX Runtime.
//!
//! Runs an UltraFace-style model (fixed 320x240 input) that emits per-prior
//! scores and corner-form boxes in relative coordinates, then applies a
//! confidence filter and greedy NMS.

use crate::types::BoundingBox;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const DETECTOR_INPUT_WIDTH: usize = 320;
const DETECTOR_INPUT_HEIGHT: usize = 240;
const DETECTOR_MEAN: f32 = 127.0;
const DETECTOR_STD: f32 = 128.0;
const DETECTOR_CONFIDENCE_THRESHOLD: f32 = 0.7;
const DETECTOR_NMS_THRESHOLD: f32 = 0.3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — place the detector ONNX file in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Candidate box in relative corner coordinates, pre-NMS.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

/// ONNX face detector.
pub struct FaceDetector {
    session: Session,
    /// (scores, boxes) output tensor indices, discovered by name at load
    /// time with positional fallback.
    output_indices: (usize, usize),
}

impl FaceDetector {
    /// Load the detector ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded face detector model"
        );

        if output_names.len() < 2 {
            return Err(DetectorError::InferenceFailed(format!(
                "detector model requires 2 outputs (scores, boxes), got {}",
                output_names.len()
            )));
        }

        // Exports name the tensors "scores"/"boxes"; older ones use bare
        // integers, in which case positional ordering applies.
        let scores_idx = output_names.iter().position(|n| n == "scores").unwrap_or(0);
        let boxes_idx = output_names.iter().position(|n| n == "boxes").unwrap_or(1);

        Ok(Self {
            session,
            output_indices: (scores_idx, boxes_idx),
        })
    }

    /// Detect faces in an RGB image, returning boxes in pixel coordinates
    /// of the source image, sorted by descending confidence.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        let (orig_w, orig_h) = image.dimensions();
        let input = Self::preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (scores_idx, boxes_idx) = self.output_indices;
        let (_, scores) = outputs[scores_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("scores: {e}")))?;
        let (_, boxes) = outputs[boxes_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("boxes: {e}")))?;

        // scores: [1, N, 2] (background, face); boxes: [1, N, 4] corner-form.
        let num_priors = scores.len() / 2;
        if boxes.len() != num_priors * 4 {
            return Err(DetectorError::InferenceFailed(format!(
                "tensor shape mismatch: {} scores vs {} box coords",
                scores.len(),
                boxes.len()
            )));
        }

        let mut candidates = Vec::new();
        for i in 0..num_priors {
            let score = scores[i * 2 + 1];
            if score < DETECTOR_CONFIDENCE_THRESHOLD {
                continue;
            }
            candidates.push(Candidate {
                x1: boxes[i * 4].clamp(0.0, 1.0),
                y1: boxes[i * 4 + 1].clamp(0.0, 1.0),
                x2: boxes[i * 4 + 2].clamp(0.0, 1.0),
                y2: boxes[i * 4 + 3].clamp(0.0, 1.0),
                score,
            });
        }

        let kept = nms(candidates, DETECTOR_NMS_THRESHOLD);
        tracing::debug!(faces = kept.len(), "detector pass complete");

        Ok(kept
            .into_iter()
            .map(|c| BoundingBox {
                x: c.x1 * orig_w as f32,
                y: c.y1 * orig_h as f32,
                width: (c.x2 - c.x1) * orig_w as f32,
                height: (c.y2 - c.y1) * orig_h as f32,
                confidence: c.score,
            })
            .collect())
    }

    /// Resize to the fixed input resolution and normalize into a NCHW tensor.
    fn preprocess(image: &RgbImage) -> Array4<f32> {
        let resized = image::imageops::resize(
            image,
            DETECTOR_INPUT_WIDTH as u32,
            DETECTOR_INPUT_HEIGHT as u32,
            FilterType::Triangle,
        );

        let mut tensor =
            Array4::<f32>::zeros((1, 3, DETECTOR_INPUT_HEIGHT, DETECTOR_INPUT_WIDTH));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] =
                    (pixel[c] as f32 - DETECTOR_MEAN) / DETECTOR_STD;
            }
        }
        tensor
    }
}

/// Greedy non-maximum suppression: keep the highest-scoring box, drop
/// everything overlapping it above `iou_threshold`, repeat.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Candidate> = Vec::new();
    for cand in candidates {
        if kept.iter().all(|k| iou(k, &cand) <= iou_threshold) {
            kept.push(cand);
        }
    }
    kept
}

/// Intersection-over-union of two corner-form boxes.
fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);

    let iw = (ix2 - ix1).max(0.0);
    let ih = (iy2 - iy1).max(0.0);
    let inter = iw * ih;

    let area_a = (a.x2 - a.x1).max(0.0) * (a.y2 - a.y1).max(0.0);
    let area_b = (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0);
    let union = area_a + area_b - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
