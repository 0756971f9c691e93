use super::post::Detection;

/// Greedy class-aware non-maximum suppression.
///
/// Candidates are visited by descending score; a candidate is dropped when it
/// overlaps an already kept detection with the same label by more than
/// `iou_threshold`. Survivors are returned in their original order.
pub fn suppress(detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    if detections.len() < 2 {
        return detections;
    }

    let mut by_score: Vec<usize> = (0..detections.len()).collect();
    by_score.sort_by(|&a, &b| detections[b].score().total_cmp(&detections[a].score()));

    let mut keep = vec![false; detections.len()];
    let mut kept: Vec<usize> = Vec::with_capacity(detections.len());

    for i in by_score {
        let candidate = &detections[i];
        let overlaps = kept.iter().any(|&k| {
            let other = &detections[k];
            other.label() == candidate.label()
                && other.bounding_box().iou(candidate.bounding_box()) > iou_threshold
        });
        if !overlaps {
            keep[i] = true;
            kept.push(i);
        }
    }

    detections
        .into_iter()
        .zip(keep)
        .filter_map(|(detection, keep)| keep.then_some(detection))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::post::BoundingBox;

    fn det(label: &str, score: f32, corners: [f32; 4]) -> Detection {
        Detection::new(label.into(), score, BoundingBox::from_corners(corners))
    }

    fn scores(detections: &[Detection]) -> Vec<f32> {
        detections.iter().map(Detection::score).collect()
    }

    #[test]
    fn test_overlapping_same_label_keeps_best() {
        let detections = vec![
            det("cat", 0.6, [0.0, 0.0, 1.0, 1.0]),
            det("cat", 0.9, [0.05, 0.05, 1.0, 1.0]),
            det("cat", 0.7, [2.0, 2.0, 3.0, 3.0]),
        ];

        let kept = suppress(detections, 0.5);
        assert_eq!(scores(&kept), [0.9, 0.7], "Original order of survivors");
    }

    #[test]
    fn test_different_labels_never_suppress() {
        let detections = vec![
            det("cat", 0.9, [0.0, 0.0, 1.0, 1.0]),
            det("dog", 0.8, [0.0, 0.0, 1.0, 1.0]),
        ];
        assert_eq!(suppress(detections, 0.5).len(), 2);
    }

    #[test]
    fn test_overlap_at_threshold_is_kept() {
        // IoU exactly 0.5: [0,0,1,1] vs [0,0,1,0.5]
        let detections = vec![
            det("cat", 0.9, [0.0, 0.0, 1.0, 1.0]),
            det("cat", 0.8, [0.0, 0.0, 1.0, 0.5]),
        ];
        assert_eq!(suppress(detections, 0.5).len(), 2);
    }

    #[test]
    fn test_suppressed_box_does_not_suppress_others() {
        // b overlaps a and c; a beats b, so c survives even though b > c.
        let detections = vec![
            det("cat", 0.9, [0.0, 0.0, 2.0, 1.0]),
            det("cat", 0.8, [1.0, 0.0, 3.0, 1.0]),
            det("cat", 0.7, [2.0, 0.0, 4.0, 1.0]),
        ];
        assert_eq!(scores(&suppress(detections, 0.3)), [0.9, 0.7]);
    }
}
