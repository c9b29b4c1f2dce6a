//! Face embedder via ONNX Runtime.
//!
//! Crops a detected face, resizes it to the canonical 112x112 input, and
//! extracts a 128-dimensional L2-normalized embedding.

use crate::types::{BoundingBox, Embedding};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const EMBEDDER_INPUT_SIZE: usize = 112;
const EMBEDDER_MEAN: f32 = 127.5;
const EMBEDDER_STD: f32 = 128.0;
const EMBEDDER_DIM: usize = 128;
/// Fraction of box width/height added on each side before cropping, so the
/// embedder sees some context around the detector's tight box.
const EMBEDDER_CROP_MARGIN: f32 = 0.10;
const EMBEDDER_MODEL_VERSION: &str = "mbf_128";

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0} — place the embedder ONNX file in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face box lies outside the image")]
    EmptyCrop,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ONNX face embedder.
pub struct FaceEmbedder {
    session: Session,
}

impl FaceEmbedder {
    /// Load the embedder ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, EmbedderError> {
        if !Path::new(model_path).exists() {
            return Err(EmbedderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face embedder model"
        );

        Ok(Self { session })
    }

    /// Extract an embedding for one detected face in an RGB image.
    pub fn embed(
        &mut self,
        image: &RgbImage,
        face: &BoundingBox,
    ) -> Result<Embedding, EmbedderError> {
        let (img_w, img_h) = image.dimensions();
        let (cx, cy, cw, ch) =
            crop_region(face, img_w, img_h).ok_or(EmbedderError::EmptyCrop)?;

        let crop = image::imageops::crop_imm(image, cx, cy, cw, ch).to_image();
        let input = Self::preprocess(&crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let raw: Vec<f32> = raw_data.to_vec();

        if raw.len() != EMBEDDER_DIM {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {EMBEDDER_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        // L2-normalize the embedding
        let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            raw.iter().map(|x| x / norm).collect()
        } else {
            raw
        };

        Ok(Embedding {
            values,
            model_version: Some(EMBEDDER_MODEL_VERSION.to_string()),
        })
    }

    /// Resize the face crop to 112x112 and normalize into a NCHW tensor.
    fn preprocess(crop: &RgbImage) -> Array4<f32> {
        let size = EMBEDDER_INPUT_SIZE;
        let resized =
            image::imageops::resize(crop, size as u32, size as u32, FilterType::Triangle);

        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] =
                    (pixel[c] as f32 - EMBEDDER_MEAN) / EMBEDDER_STD;
            }
        }
        tensor
    }
}

/// Expand a face box by the crop margin and clamp to the image bounds.
/// Returns `(x, y, width, height)`, or `None` for a degenerate crop.
fn crop_region(face: &BoundingBox, img_w: u32, img_h: u32) -> Option<(u32, u32, u32, u32)> {
    let margin_x = face.width * EMBEDDER_CROP_MARGIN;
    let margin_y = face.height * EMBEDDER_CROP_MARGIN;

    let x1 = (face.x - margin_x).max(0.0);
    let y1 = (face.y - margin_y).max(0.0);
    let x2 = (face.x + face.width + margin_x).min(img_w as f32);
    let y2 = (face.y + face.height + margin_y).min(img_h as f32);

    let w = (x2 - x1).floor() as u32;
    let h = (y2 - y1).floor() as u32;
    if w == 0 || h == 0 {
        return None;
    }
    Some((x1.floor() as u32, y1.floor() as u32, w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32, width: f32, height: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width,
            height,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_preprocess_output_shape() {
        let crop = RgbImage::from_pixel(50, 60, image::Rgb([128, 128, 128]));
        let tensor = FaceEmbedder::preprocess(&crop);
        assert_eq!(
            tensor.shape(),
            &[1, 3, EMBEDDER_INPUT_SIZE, EMBEDDER_INPUT_SIZE]
        );
    }

    #[test]
    fn test_preprocess_normalization() {
        let crop = RgbImage::from_pixel(
            EMBEDDER_INPUT_SIZE as u32,
            EMBEDDER_INPUT_SIZE as u32,
            image::Rgb([128, 128, 128]),
        );
        let tensor = FaceEmbedder::preprocess(&crop);
        let expected = (128.0 - EMBEDDER_MEAN) / EMBEDDER_STD;
        assert!((tensor[[0, 0, 0, 0]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_crop_region_interior_box() {
        let region = crop_region(&bbox(100.0, 100.0, 100.0, 100.0), 640, 480).unwrap();
        // 10% margin on each side.
        assert_eq!(region, (90, 90, 120, 120));
    }

    #[test]
    fn test_crop_region_clamps_to_image() {
        let (x, y, w, h) = crop_region(&bbox(-10.0, -10.0, 100.0, 100.0), 640, 480).unwrap();
        assert_eq!((x, y), (0, 0));
        assert!(w <= 640 && h <= 480);
    }

    #[test]
    fn test_crop_region_degenerate() {
        assert!(crop_region(&bbox(700.0, 500.0, 50.0, 50.0), 640, 480).is_none());
    }
}
