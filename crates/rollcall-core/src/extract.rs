//! The extraction capability boundary: image in, zero or more faces out.

use crate::detector::{DetectorError, FaceDetector};
use crate::embedder::{EmbedderError, FaceEmbedder};
use crate::types::{BoundingBox, Embedding};
use image::RgbImage;
use thiserror::Error;

/// A face found in an image: where it is plus its identity vector.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

#[derive(Error, Debug)]
pub enum ExtractError {
    /// The input could not be decoded as an image at all — distinct from a
    /// valid image containing zero faces.
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("could not produce an embedding for a detected face: {0}")]
    Embedder(#[from] EmbedderError),
}

/// Maps an image to the faces it contains. Implementations must tolerate
/// zero detections (an empty result is not an error).
pub trait FaceExtractor {
    fn detect_and_embed(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, ExtractError>;
}

/// Decode raw upload bytes (JPEG/PNG) into an RGB image.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, ExtractError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| ExtractError::InvalidImage(e.to_string()))
}

/// Default extractor: ONNX detector + ONNX embedder composed sequentially.
pub struct OnnxExtractor {
    detector: FaceDetector,
    embedder: FaceEmbedder,
}

impl OnnxExtractor {
    /// Load both models. Fails fast if either file is missing.
    pub fn load(detector_path: &str, embedder_path: &str) -> Result<Self, ExtractError> {
        let detector = FaceDetector::load(detector_path)?;
        let embedder = FaceEmbedder::load(embedder_path)?;
        Ok(Self { detector, embedder })
    }
}

impl FaceExtractor for OnnxExtractor {
    fn detect_and_embed(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, ExtractError> {
        let faces = self.detector.detect(image)?;

        let mut out = Vec::with_capacity(faces.len());
        for bbox in faces {
            let embedding = self.embedder.embed(image, &bbox)?;
            out.push(DetectedFace { bbox, embedding });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_image_rejects_garbage() {
        let result = decode_image(b"definitely not an image");
        assert!(matches!(result, Err(ExtractError::InvalidImage(_))));
    }

    #[test]
    fn test_decode_image_roundtrip_png() {
        let image = RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]));
        let mut bytes = Vec::new();
        image
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .unwrap();

        let decoded = decode_image(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (4, 4));
        assert_eq!(decoded.get_pixel(0, 0), &image::Rgb([10, 20, 30]));
    }
}
