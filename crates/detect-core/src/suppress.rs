//! Greedy non-max suppression over decoded candidate boxes.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::types::Detection;

/// Guards the IoU division when both boxes are degenerate.
const IOU_EPSILON: f32 = 1e-9;

/// Removes overlapping duplicate detections, either across all classes or
/// independently within each class.
#[derive(Debug, Clone, Copy)]
pub struct Suppressor {
    iou_threshold: f32,
    class_agnostic: bool,
}

impl Suppressor {
    pub fn new(iou_threshold: f32, class_agnostic: bool) -> Self {
        Self {
            iou_threshold,
            class_agnostic,
        }
    }

    /// Run suppression over a candidate set.
    ///
    /// Deterministic: candidates are stable-sorted by descending score, so
    /// ties keep their input order. Detections of different classes never
    /// suppress each other unless the suppressor is class-agnostic.
    pub fn suppress(&self, dets: Vec<Detection>) -> Vec<Detection> {
        if dets.is_empty() || self.class_agnostic {
            return self.sweep(dets);
        }

        // BTreeMap keeps the per-class output ordered by class id.
        let mut by_class: BTreeMap<usize, Vec<Detection>> = BTreeMap::new();
        for det in dets {
            by_class.entry(det.class_id).or_default().push(det);
        }

        let mut kept = Vec::new();
        for (_, partition) in by_class {
            kept.extend(self.sweep(partition));
        }
        kept
    }

    fn sweep(&self, mut dets: Vec<Detection>) -> Vec<Detection> {
        dets.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        let mut kept: Vec<Detection> = Vec::with_capacity(dets.len());
        for det in dets {
            if kept.iter().all(|k| iou(k, &det) <= self.iou_threshold) {
                kept.push(det);
            }
        }
        kept
    }
}

/// Intersection-over-union of two axis-aligned boxes. Degenerate boxes
/// contribute zero area instead of producing division errors.
pub fn iou(a: &Detection, b: &Detection) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);

    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    inter / (a.area() + b.area() - inter + IOU_EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, score: f32, class_id: usize) -> Detection {
        Detection::new(x1, y1, x2, y2, score, class_id)
    }

    #[test]
    fn test_iou_disjoint_is_zero() {
        let a = det(0.0, 0.0, 10.0, 10.0, 1.0, 0);
        let b = det(20.0, 20.0, 30.0, 30.0, 1.0, 0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_iou_identical_is_one() {
        let a = det(0.0, 0.0, 10.0, 10.0, 1.0, 0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_degenerate_box_is_zero() {
        let a = det(5.0, 5.0, 5.0, 5.0, 1.0, 0);
        let b = det(0.0, 0.0, 10.0, 10.0, 1.0, 0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_zero_threshold_keeps_only_disjoint_boxes() {
        let dets = vec![
            det(0.0, 0.0, 10.0, 10.0, 0.9, 0),
            det(5.0, 5.0, 15.0, 15.0, 0.8, 0),
            det(100.0, 100.0, 110.0, 110.0, 0.7, 0),
        ];
        let kept = Suppressor::new(0.0, true).suppress(dets);

        assert_eq!(kept.len(), 2);
        assert!((kept[0].score - 0.9).abs() < 1e-6);
        assert!((kept[1].score - 0.7).abs() < 1e-6);
        for a in &kept {
            for b in &kept {
                if a != b {
                    assert_eq!(iou(a, b), 0.0);
                }
            }
        }
    }

    #[test]
    fn test_unit_threshold_keeps_everything() {
        let dets = vec![
            det(0.0, 0.0, 10.0, 10.0, 0.5, 0),
            det(1.0, 1.0, 11.0, 11.0, 0.9, 0),
            det(2.0, 2.0, 12.0, 12.0, 0.7, 1),
        ];
        let kept = Suppressor::new(1.0, true).suppress(dets.clone());
        assert_eq!(kept.len(), dets.len());
    }

    #[test]
    fn test_per_class_never_crosses_classes() {
        // Same box, different classes: agnostic collapses them, per-class
        // keeps both.
        let dets = vec![
            det(0.0, 0.0, 10.0, 10.0, 0.9, 0),
            det(0.0, 0.0, 10.0, 10.0, 0.8, 1),
        ];

        let agnostic = Suppressor::new(0.45, true).suppress(dets.clone());
        assert_eq!(agnostic.len(), 1);
        assert_eq!(agnostic[0].class_id, 0);

        let per_class = Suppressor::new(0.45, false).suppress(dets);
        assert_eq!(per_class.len(), 2);
    }

    #[test]
    fn test_highest_score_wins_within_class() {
        let dets = vec![
            det(0.0, 0.0, 10.0, 10.0, 0.6, 3),
            det(1.0, 1.0, 10.0, 10.0, 0.95, 3),
        ];
        let kept = Suppressor::new(0.45, false).suppress(dets);

        assert_eq!(kept.len(), 1);
        assert!((kept[0].score - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_score_ties_keep_input_order() {
        // Identical boxes and scores, distinguishable only by class id.
        let dets = vec![
            det(0.0, 0.0, 10.0, 10.0, 0.5, 7),
            det(0.0, 0.0, 10.0, 10.0, 0.5, 9),
        ];
        let kept = Suppressor::new(0.45, true).suppress(dets);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].class_id, 7);
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        assert!(Suppressor::new(0.45, true).suppress(Vec::new()).is_empty());
        assert!(Suppressor::new(0.45, false).suppress(Vec::new()).is_empty());
    }
}
