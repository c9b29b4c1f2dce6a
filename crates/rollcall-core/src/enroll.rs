//! Enrollment guard: decode → detect → single-face check → duplicate check.
//!
//! The duplicate check is a best-effort guard, not a hard invariant: it scans
//! the gallery snapshot passed in, so two concurrent enrollments of similar
//! faces can both pass before either is stored. Serializing all enrollments
//! to close that window is intentionally not done here.

use crate::extract::{decode_image, ExtractError, FaceExtractor};
use crate::matcher::Matcher;
use crate::types::{Embedding, GalleryEntry};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("no face detected in the image")]
    NoFaceDetected,
    #[error("{0} faces detected — provide an image with only one face")]
    MultipleFacesDetected(usize),
    #[error("this face already belongs to {0} — registration blocked to prevent impersonation")]
    DuplicateFace(String),
    #[error("could not generate a face embedding: {0}")]
    ExtractionFailed(String),
}

impl From<ExtractError> for EnrollError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::InvalidImage(msg) => EnrollError::InvalidImage(msg),
            other => EnrollError::ExtractionFailed(other.to_string()),
        }
    }
}

/// Run the enrollment pipeline for `identity` over a single uploaded image.
///
/// Returns the embedding(s) to store on success. The caller is responsible
/// for persisting them and for having verified that `identity` exists and is
/// not yet enrolled.
pub fn enroll_image(
    extractor: &mut dyn FaceExtractor,
    matcher: &dyn Matcher,
    gallery: &[GalleryEntry],
    identity: &str,
    image_bytes: &[u8],
    duplicate_tolerance: f32,
) -> Result<Vec<Embedding>, EnrollError> {
    let image = decode_image(image_bytes)?;
    let faces = extractor.detect_and_embed(&image)?;

    if faces.len() > 1 {
        return Err(EnrollError::MultipleFacesDetected(faces.len()));
    }
    let embedding = faces
        .into_iter()
        .next()
        .ok_or(EnrollError::NoFaceDetected)?
        .embedding;

    if let Some(owner) =
        matcher.find_duplicate(&embedding, gallery, identity, duplicate_tolerance)
    {
        tracing::warn!(identity, owner = %owner, "duplicate face rejected");
        return Err(EnrollError::DuplicateFace(owner));
    }

    tracing::info!(identity, dim = embedding.dim(), "face enrolled");
    Ok(vec![embedding])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::DetectedFace;
    use crate::matcher::EuclideanMatcher;
    use crate::types::BoundingBox;
    use image::RgbImage;

    /// Canned extractor returning a fixed set of faces.
    struct FakeExtractor {
        faces: Vec<DetectedFace>,
    }

    impl FaceExtractor for FakeExtractor {
        fn detect_and_embed(
            &mut self,
            _image: &RgbImage,
        ) -> Result<Vec<DetectedFace>, ExtractError> {
            Ok(self.faces.clone())
        }
    }

    fn face(values: Vec<f32>) -> DetectedFace {
        DetectedFace {
            bbox: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
                confidence: 0.9,
            },
            embedding: Embedding {
                values,
                model_version: None,
            },
        }
    }

    fn entry(identity: &str, values: Vec<f32>) -> GalleryEntry {
        GalleryEntry {
            identity: identity.into(),
            embedding: Embedding {
                values,
                model_version: None,
            },
        }
    }

    fn png_bytes() -> Vec<u8> {
        let image = RgbImage::from_pixel(8, 8, image::Rgb([90, 90, 90]));
        let mut bytes = Vec::new();
        image
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .unwrap();
        bytes
    }

    #[test]
    fn test_enroll_rejects_garbage_bytes() {
        let mut extractor = FakeExtractor { faces: vec![] };
        let result = enroll_image(
            &mut extractor,
            &EuclideanMatcher,
            &[],
            "S100",
            b"not an image",
            0.45,
        );
        assert!(matches!(result, Err(EnrollError::InvalidImage(_))));
    }

    #[test]
    fn test_enroll_no_face() {
        let mut extractor = FakeExtractor { faces: vec![] };
        let result = enroll_image(
            &mut extractor,
            &EuclideanMatcher,
            &[],
            "S100",
            &png_bytes(),
            0.45,
        );
        assert!(matches!(result, Err(EnrollError::NoFaceDetected)));
    }

    #[test]
    fn test_enroll_multiple_faces() {
        let mut extractor = FakeExtractor {
            faces: vec![face(vec![1.0, 0.0]), face(vec![0.0, 1.0])],
        };
        let result = enroll_image(
            &mut extractor,
            &EuclideanMatcher,
            &[],
            "S100",
            &png_bytes(),
            0.45,
        );
        assert!(matches!(result, Err(EnrollError::MultipleFacesDetected(2))));
    }

    #[test]
    fn test_enroll_duplicate_face_names_owner() {
        let mut extractor = FakeExtractor {
            faces: vec![face(vec![0.0, 0.0])],
        };
        // S200's stored vector is 0.30 away — under the 0.45 tolerance.
        let gallery = vec![entry("S200", vec![0.3, 0.0])];
        let result = enroll_image(
            &mut extractor,
            &EuclideanMatcher,
            &gallery,
            "S100",
            &png_bytes(),
            0.45,
        );
        match result {
            Err(EnrollError::DuplicateFace(owner)) => assert_eq!(owner, "S200"),
            other => panic!("expected DuplicateFace, got {other:?}"),
        }
    }

    #[test]
    fn test_enroll_accepts_face_at_tolerance_boundary() {
        let mut extractor = FakeExtractor {
            faces: vec![face(vec![0.0, 0.0])],
        };
        // Exactly 0.45 away: the boundary is exclusive, so this is allowed.
        let gallery = vec![entry("S200", vec![0.45, 0.0])];
        let result = enroll_image(
            &mut extractor,
            &EuclideanMatcher,
            &gallery,
            "S100",
            &png_bytes(),
            0.45,
        );
        assert_eq!(result.unwrap().len(), 1);
    }

    #[test]
    fn test_enroll_ignores_own_existing_vectors() {
        let mut extractor = FakeExtractor {
            faces: vec![face(vec![0.0, 0.0])],
        };
        let gallery = vec![entry("S100", vec![0.1, 0.0])];
        let result = enroll_image(
            &mut extractor,
            &EuclideanMatcher,
            &gallery,
            "S100",
            &png_bytes(),
            0.45,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_enroll_success_returns_embedding() {
        let mut extractor = FakeExtractor {
            faces: vec![face(vec![0.5, 0.5])],
        };
        let embeddings = enroll_image(
            &mut extractor,
            &EuclideanMatcher,
            &[],
            "S100",
            &png_bytes(),
            0.45,
        )
        .unwrap();
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0].values, vec![0.5, 0.5]);
    }
}
