//! rollcall-core — Face matching and enrollment engine.
//!
//! Detects faces with a single-stage ONNX detector, extracts 128-dimensional
//! embeddings, and matches them against the enrolled gallery by Euclidean
//! distance under a configurable tolerance.

pub mod detector;
pub mod embedder;
pub mod enroll;
pub mod extract;
pub mod matcher;
pub mod types;

pub use enroll::{enroll_image, EnrollError};
pub use extract::{decode_image, DetectedFace, ExtractError, FaceExtractor, OnnxExtractor};
pub use matcher::{BestMatch, EuclideanMatcher, Matcher};
pub use types::{BoundingBox, Embedding, GalleryEntry};

use std::path::PathBuf;

/// Default directory for ONNX model files: `$XDG_DATA_HOME/rollcall/models`,
/// falling back to `~/.local/share/rollcall/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall/models")
}
