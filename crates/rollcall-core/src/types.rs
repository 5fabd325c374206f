//! Identity types: embeddings, detections, per-face decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("embedding dimension mismatch: expected {expected}, got {actual}")]
pub struct DimensionMismatchError {
    pub expected: usize,
    pub actual: usize,
}

/// Fixed-dimension face embedding vector.
///
/// Embeddings are only ever compared against embeddings of the same
/// dimension; a mismatch is an error, never a silent truncation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance to another embedding of the same dimension.
    pub fn euclidean_distance(&self, other: &Embedding) -> Result<f32, DimensionMismatchError> {
        if self.dim() != other.dim() {
            return Err(DimensionMismatchError {
                expected: self.dim(),
                actual: other.dim(),
            });
        }
        let sum = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>();
        Ok(sum.sqrt())
    }
}

/// Bounding box of a detected face, in pixel coordinates of the
/// normalized frame it was found in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One face found in one frame, prior to identity resolution.
/// Transient: discarded once the attendance decision is made.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub embedding: Embedding,
}

/// Per-face identity decision emitted by the matcher.
///
/// `subject_id` is `None` when no gallery entry was within threshold.
/// `distance` is the best distance seen, recorded even for unmatched
/// decisions; it is `None` only when the gallery was empty or every
/// entry was excluded.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityDecision {
    pub subject_id: Option<String>,
    pub distance: Option<f32>,
    pub bounding_box: BoundingBox,
    pub frame_timestamp: DateTime<Utc>,
}

impl IdentityDecision {
    pub fn is_match(&self) -> bool {
        self.subject_id.is_some()
    }
}

/// An enrolled subject: the unit of the gallery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub subject_id: String,
    pub embedding: Embedding,
    /// Opaque handle to the reference photo used at enrollment time.
    pub reference_image: Option<String>,
    pub enrolled_at: DateTime<Utc>,
}
