//! Identity matching against the enrollment gallery.

use crate::types::{Detection, DimensionMismatchError, Enrollment, IdentityDecision};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// The set of enrolled subjects available for matching.
///
/// Entries keep their insertion order, which is also the tie-break
/// order: when two subjects sit at the same minimum distance, the one
/// enrolled first wins. Re-enrolling a subject replaces its embedding
/// in place, preserving its original position.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<Enrollment>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Embedding dimension shared by every entry, or `None` when empty.
    pub fn dim(&self) -> Option<usize> {
        self.entries.first().map(|e| e.embedding.dim())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Enrollment> {
        self.entries.iter()
    }

    /// Add or replace an enrollment.
    ///
    /// Fails fast when the embedding's dimension differs from the
    /// gallery's established dimension, so a corrupt enrollment can
    /// never skew distance computation.
    pub fn insert(&mut self, enrollment: Enrollment) -> Result<(), DimensionMismatchError> {
        if let Some(dim) = self.dim() {
            if enrollment.embedding.dim() != dim {
                return Err(DimensionMismatchError {
                    expected: dim,
                    actual: enrollment.embedding.dim(),
                });
            }
        }
        match self
            .entries
            .iter_mut()
            .find(|e| e.subject_id == enrollment.subject_id)
        {
            Some(existing) => *existing = enrollment,
            None => self.entries.push(enrollment),
        }
        Ok(())
    }
}

/// Resolve each detection to an identity decision.
///
/// A detection matches the gallery entry of minimum Euclidean distance,
/// provided that distance is strictly below `threshold`; a distance
/// equal to the threshold is unmatched. Decisions come back in
/// detection order. Entries whose dimension mismatches the probe are
/// excluded from the pass with a warning; the pass itself never fails.
pub fn match_detections(
    detections: &[Detection],
    gallery: &Gallery,
    threshold: f32,
    frame_timestamp: DateTime<Utc>,
) -> Vec<IdentityDecision> {
    let mut warned: HashSet<&str> = HashSet::new();

    detections
        .iter()
        .map(|detection| {
            let mut best: Option<(&Enrollment, f32)> = None;

            for entry in gallery.iter() {
                match detection.embedding.euclidean_distance(&entry.embedding) {
                    Ok(distance) => {
                        // Strict < keeps the first-inserted entry on ties.
                        let better = match best {
                            None => true,
                            Some((_, best_distance)) => distance < best_distance,
                        };
                        if better {
                            best = Some((entry, distance));
                        }
                    }
                    Err(err) => {
                        if warned.insert(entry.subject_id.as_str()) {
                            tracing::warn!(
                                subject = %entry.subject_id,
                                expected = err.expected,
                                actual = err.actual,
                                "enrollment excluded from matching pass"
                            );
                        }
                    }
                }
            }

            let (subject_id, distance) = match best {
                Some((entry, distance)) if distance < threshold => {
                    (Some(entry.subject_id.clone()), Some(distance))
                }
                Some((_, distance)) => (None, Some(distance)),
                None => (None, None),
            };

            IdentityDecision {
                subject_id,
                distance,
                bounding_box: detection.bounding_box,
                frame_timestamp,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Embedding};

    fn enrollment(subject_id: &str, values: Vec<f32>) -> Enrollment {
        Enrollment {
            subject_id: subject_id.to_string(),
            embedding: Embedding::new(values),
            reference_image: None,
            enrolled_at: Utc::now(),
        }
    }

    fn detection(values: Vec<f32>) -> Detection {
        Detection {
            bounding_box: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
            },
            embedding: Embedding::new(values),
        }
    }

    fn gallery_of(entries: Vec<Enrollment>) -> Gallery {
        let mut g = Gallery::new();
        for e in entries {
            g.insert(e).unwrap();
        }
        g
    }

    #[test]
    fn matches_within_threshold() {
        // Probe at distance 0.3 from alice, threshold 0.55
        let g = gallery_of(vec![enrollment("alice", vec![0.0, 0.0])]);
        let decisions = match_detections(&[detection(vec![0.3, 0.0])], &g, 0.55, Utc::now());
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].subject_id.as_deref(), Some("alice"));
        assert!((decisions[0].distance.unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn does_not_match_beyond_threshold() {
        let g = gallery_of(vec![enrollment("alice", vec![0.0, 0.0])]);
        let decisions = match_detections(&[detection(vec![0.7, 0.0])], &g, 0.55, Utc::now());
        assert_eq!(decisions[0].subject_id, None);
        assert!((decisions[0].distance.unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn boundary_distance_is_unmatched() {
        // distance == threshold must NOT match
        let g = gallery_of(vec![enrollment("alice", vec![0.0])]);
        let decisions = match_detections(&[detection(vec![0.55])], &g, 0.55, Utc::now());
        assert_eq!(decisions[0].subject_id, None);
    }

    #[test]
    fn picks_minimum_distance_entry() {
        let g = gallery_of(vec![
            enrollment("far", vec![10.0, 0.0]),
            enrollment("near", vec![0.1, 0.0]),
        ]);
        let decisions = match_detections(&[detection(vec![0.0, 0.0])], &g, 0.55, Utc::now());
        assert_eq!(decisions[0].subject_id.as_deref(), Some("near"));
    }

    #[test]
    fn tie_breaks_by_insertion_order() {
        // Both entries are equidistant from the probe; first inserted wins.
        let g = gallery_of(vec![
            enrollment("first", vec![0.2, 0.0]),
            enrollment("second", vec![-0.2, 0.0]),
        ]);
        let decisions = match_detections(&[detection(vec![0.0, 0.0])], &g, 0.55, Utc::now());
        assert_eq!(decisions[0].subject_id.as_deref(), Some("first"));
    }

    #[test]
    fn tie_break_is_deterministic_across_calls() {
        let g = gallery_of(vec![
            enrollment("first", vec![0.2, 0.0]),
            enrollment("second", vec![-0.2, 0.0]),
        ]);
        let probe = [detection(vec![0.0, 0.0])];
        let a = match_detections(&probe, &g, 0.55, Utc::now());
        for _ in 0..10 {
            let b = match_detections(&probe, &g, 0.55, Utc::now());
            assert_eq!(a[0].subject_id, b[0].subject_id);
            assert_eq!(a[0].distance, b[0].distance);
        }
    }

    #[test]
    fn empty_gallery_yields_unmatched() {
        let g = Gallery::new();
        let decisions = match_detections(
            &[detection(vec![1.0]), detection(vec![2.0])],
            &g,
            0.55,
            Utc::now(),
        );
        assert_eq!(decisions.len(), 2);
        assert!(decisions.iter().all(|d| d.subject_id.is_none()));
        assert!(decisions.iter().all(|d| d.distance.is_none()));
    }

    #[test]
    fn empty_detections_yield_empty_decisions() {
        let g = gallery_of(vec![enrollment("alice", vec![0.0])]);
        let decisions = match_detections(&[], &g, 0.55, Utc::now());
        assert!(decisions.is_empty());
    }

    #[test]
    fn decisions_preserve_detection_order() {
        let g = gallery_of(vec![
            enrollment("a", vec![0.0, 0.0]),
            enrollment("b", vec![5.0, 0.0]),
        ]);
        let detections = [detection(vec![5.0, 0.1]), detection(vec![0.0, 0.1])];
        let decisions = match_detections(&detections, &g, 0.55, Utc::now());
        assert_eq!(decisions[0].subject_id.as_deref(), Some("b"));
        assert_eq!(decisions[1].subject_id.as_deref(), Some("a"));
    }

    #[test]
    fn mismatched_entry_is_excluded_not_fatal() {
        // Gallery dimension checks stop mismatches at insert time, so
        // build the mismatch directly: probe dim differs from entries.
        let g = gallery_of(vec![enrollment("alice", vec![0.0, 0.0])]);
        let decisions = match_detections(&[detection(vec![0.0, 0.0, 0.0])], &g, 0.55, Utc::now());
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].subject_id, None);
        assert_eq!(decisions[0].distance, None);
    }

    #[test]
    fn gallery_insert_rejects_dimension_mismatch() {
        let mut g = Gallery::new();
        g.insert(enrollment("alice", vec![0.0, 0.0])).unwrap();
        let err = g.insert(enrollment("bob", vec![0.0])).unwrap_err();
        assert_eq!(err.expected, 2);
        assert_eq!(err.actual, 1);
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn gallery_reenrollment_replaces_in_place() {
        let mut g = Gallery::new();
        g.insert(enrollment("alice", vec![0.0, 0.0])).unwrap();
        g.insert(enrollment("bob", vec![9.0, 9.0])).unwrap();
        g.insert(enrollment("alice", vec![1.0, 1.0])).unwrap();

        assert_eq!(g.len(), 2);
        let first = g.iter().next().unwrap();
        assert_eq!(first.subject_id, "alice");
        assert_eq!(first.embedding.values, vec![1.0, 1.0]);
    }
}
