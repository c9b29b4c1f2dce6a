use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, in pixel coordinates of the source image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Face embedding vector (128-dimensional for the default embedder).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "mbf_128").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Compute Euclidean (L2) distance between two embeddings.
    ///
    /// Lower = more similar. Two captures of the same face typically land
    /// well under the 0.45 default tolerance.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Number of dimensions in this embedding.
    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

/// One enrolled vector in the gallery: the owning identity plus the vector.
///
/// An identity with several stored vectors appears once per vector, in
/// insertion order — the order the matcher's tie-break is defined over.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub identity: String,
    pub embedding: Embedding,
}
