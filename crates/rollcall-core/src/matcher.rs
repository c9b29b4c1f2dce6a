//! Gallery matching by Euclidean distance.
//!
//! The gallery is a full scan — acceptable at the expected scale of a few
//! thousand stored vectors. An index structure can be substituted behind the
//! [`Matcher`] trait without changing its contract.

use crate::types::{Embedding, GalleryEntry};

/// The globally closest gallery entry to a probe embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct BestMatch {
    pub identity: String,
    pub distance: f32,
}

impl BestMatch {
    /// Whether this match clears the recognition tolerance.
    ///
    /// The boundary is exclusive: a minimum found at exactly the tolerance
    /// is classified "unknown", not a match.
    pub fn is_within(&self, tolerance: f32) -> bool {
        self.distance < tolerance
    }
}

/// Strategy for matching a probe embedding against the enrolled gallery.
pub trait Matcher {
    /// Find the gallery entry with the globally minimum distance to `probe`.
    ///
    /// Returns `None` iff the gallery is empty. The caller classifies the
    /// result against its tolerance via [`BestMatch::is_within`]. Ties are
    /// broken toward the entry encountered first in gallery order.
    fn best_match(&self, probe: &Embedding, gallery: &[GalleryEntry]) -> Option<BestMatch>;

    /// Find the first entry within `tolerance` of `probe` that belongs to an
    /// identity other than `exclude`.
    ///
    /// Used during registration to block a face already enrolled under a
    /// different identity. Returns the owning identity, or `None`.
    fn find_duplicate(
        &self,
        probe: &Embedding,
        gallery: &[GalleryEntry],
        exclude: &str,
        tolerance: f32,
    ) -> Option<String>;
}

/// Euclidean-distance matcher over a linear gallery scan.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn best_match(&self, probe: &Embedding, gallery: &[GalleryEntry]) -> Option<BestMatch> {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, entry) in gallery.iter().enumerate() {
            let dist = probe.euclidean_distance(&entry.embedding);
            // Strict `<` keeps the first-encountered entry on equal distances.
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        best_idx.map(|idx| BestMatch {
            identity: gallery[idx].identity.clone(),
            distance: best_dist,
        })
    }

    fn find_duplicate(
        &self,
        probe: &Embedding,
        gallery: &[GalleryEntry],
        exclude: &str,
        tolerance: f32,
    ) -> Option<String> {
        for entry in gallery {
            if entry.identity == exclude {
                continue;
            }
            if probe.euclidean_distance(&entry.embedding) < tolerance {
                return Some(entry.identity.clone());
            }
        }
        None
    }
}
