use std::cmp::Ordering;

use super::Detection;

/// Greedy non-maximum suppression.
///
/// Detections are visited by descending confidence (stable for ties, so input
/// order decides between equal confidences). A detection is kept unless its IoU
/// with an already kept detection exceeds `iou_threshold`. At most
/// `max_detections` are kept.
///
/// Return
/// ----------
/// * The kept detections, ordered by descending confidence.
pub fn non_max_suppression(
    detections: Vec<Detection>,
    iou_threshold: f64,
    max_detections: usize,
) -> Vec<Detection> {
    let mut sorted = detections;
    sorted.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::with_capacity(sorted.len().min(max_detections));
    for candidate in sorted {
        if kept.len() == max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.bbox.iou(&candidate.bbox) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
