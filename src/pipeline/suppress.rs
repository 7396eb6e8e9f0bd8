//! Confidence filtering, non-maximum suppression, and bounds clamping.
//!
//! This stage restores the precision the detector deliberately gave up:
//! candidates below the display threshold are discarded, overlapping boxes
//! for the same spatial region collapse to their highest-confidence
//! representative, and survivors are clamped into the page so every
//! downstream crop is a valid pixel rectangle.
//!
//! Suppression is class-agnostic: two boxes covering the same ink are the
//! same region even when the model wavers between "Equation" and "Text"
//! for it.

use crate::config::PipelineConfig;
use crate::pipeline::detect::Detection;

/// Filter, suppress, and clamp one page's candidates.
///
/// Output order is not significant; for equal confidences the earlier
/// candidate wins deterministically (stable sort).
pub fn suppress(
    candidates: Vec<Detection>,
    page_w: u32,
    page_h: u32,
    config: &PipelineConfig,
) -> Vec<Detection> {
    let displayed: Vec<Detection> = candidates
        .into_iter()
        .filter(|d| d.confidence >= config.display_threshold)
        .collect();

    let kept = non_max_suppression(displayed, config.nms_iou_threshold);

    kept.into_iter()
        .map(|d| clamp_to_page(d, page_w as f32, page_h as f32))
        .collect()
}

/// Class-agnostic NMS: keep the highest-confidence box of every cluster of
/// boxes whose pairwise IoU exceeds `iou_threshold`.
///
/// Idempotent: survivors pairwise overlap at most `iou_threshold`, so a
/// second pass changes nothing.
pub fn non_max_suppression(boxes: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    if boxes.is_empty() {
        return boxes;
    }

    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| {
        boxes[b]
            .confidence
            .partial_cmp(&boxes[a].confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut suppressed = vec![false; boxes.len()];
    let mut keep = Vec::new();

    for &i in &order {
        if suppressed[i] {
            continue;
        }
        keep.push(i);

        for &j in &order {
            if i != j && !suppressed[j] && boxes[i].bbox.iou(&boxes[j].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep.into_iter().map(|i| boxes[i]).collect()
}

/// Clamp a detection's box into `[0, page_w] × [0, page_h]`.
///
/// Clamping can shrink a box to zero area (a detection hanging entirely off
/// the page edge); the extractor skips those rather than failing.
fn clamp_to_page(mut d: Detection, page_w: f32, page_h: f32) -> Detection {
    let x1 = d.bbox.x.max(0.0).min(page_w);
    let y1 = d.bbox.y.max(0.0).min(page_h);
    let x2 = d.bbox.right().min(page_w).max(x1);
    let y2 = d.bbox.bottom().min(page_h).max(y1);

    d.bbox.x = x1;
    d.bbox.y = y1;
    d.bbox.width = x2 - x1;
    d.bbox.height = y2 - y1;
    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::detect::BoundingBox;

    fn det(class_id: usize, confidence: f32, x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection {
            class_id,
            confidence,
            bbox: BoundingBox::new(x, y, w, h),
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn below_display_threshold_is_dropped() {
        let out = suppress(
            vec![det(0, 0.9, 10.0, 10.0, 50.0, 20.0), det(1, 0.3, 200.0, 10.0, 50.0, 20.0)],
            1000,
            800,
            &config(),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class_id, 0);
    }

    #[test]
    fn nms_keeps_highest_confidence_of_overlapping_pair() {
        // Same class, IoU well above 0.3.
        let winner = det(0, 0.9, 100.0, 100.0, 80.0, 40.0);
        let loser = det(0, 0.6, 105.0, 102.0, 80.0, 40.0);
        let out = non_max_suppression(vec![loser, winner], 0.3);
        assert_eq!(out.len(), 1);
        assert!((out[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn nms_is_class_agnostic() {
        // Different classes, same spatial region: still collapses.
        let winner = det(0, 0.9, 100.0, 100.0, 80.0, 40.0);
        let loser = det(1, 0.8, 102.0, 101.0, 80.0, 40.0);
        let out = non_max_suppression(vec![winner, loser], 0.3);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn nms_keeps_disjoint_boxes() {
        let a = det(0, 0.9, 0.0, 0.0, 50.0, 50.0);
        let b = det(0, 0.8, 500.0, 500.0, 50.0, 50.0);
        let out = non_max_suppression(vec![a, b], 0.3);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn nms_is_idempotent() {
        let boxes = vec![
            det(0, 0.9, 100.0, 100.0, 80.0, 40.0),
            det(0, 0.7, 104.0, 100.0, 80.0, 40.0),
            det(1, 0.8, 400.0, 100.0, 60.0, 30.0),
            det(1, 0.6, 402.0, 102.0, 60.0, 30.0),
        ];
        let once = non_max_suppression(boxes, 0.3);
        let twice = non_max_suppression(once.clone(), 0.3);
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(&twice) {
            assert_eq!(a.bbox, b.bbox);
            assert_eq!(a.class_id, b.class_id);
        }
    }

    #[test]
    fn clamp_invariant_holds_for_out_of_bounds_boxes() {
        let out = suppress(
            vec![
                det(0, 0.9, -20.0, -10.0, 100.0, 50.0),
                det(1, 0.8, 950.0, 750.0, 200.0, 200.0),
            ],
            1000,
            800,
            &config(),
        );
        assert_eq!(out.len(), 2);
        for d in &out {
            assert!(d.bbox.x >= 0.0);
            assert!(d.bbox.y >= 0.0);
            assert!(d.bbox.right() <= 1000.0);
            assert!(d.bbox.bottom() <= 800.0);
            assert!(d.bbox.width >= 0.0);
            assert!(d.bbox.height >= 0.0);
        }
    }

    #[test]
    fn fully_off_page_box_clamps_to_zero_area() {
        let out = suppress(
            vec![det(0, 0.9, 2000.0, 2000.0, 100.0, 100.0)],
            1000,
            800,
            &config(),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bbox.area(), 0.0);
    }

    #[test]
    fn equal_confidence_tie_is_deterministic() {
        let a = det(0, 0.8, 100.0, 100.0, 80.0, 40.0);
        let b = det(0, 0.8, 103.0, 101.0, 80.0, 40.0);
        let first = non_max_suppression(vec![a, b], 0.3);
        let second = non_max_suppression(vec![a, b], 0.3);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].bbox, second[0].bbox);
    }
}
