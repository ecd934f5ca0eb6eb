use crate::shared::geometry::Rect;

/// A candidate face box with its detector score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub rect: Rect,
    pub score: f32,
}

impl Detection {
    pub fn new(rect: Rect, score: f32) -> Self {
        Self { rect, score }
    }
}

/// Greedy NMS: keeps the highest score of every cluster whose pairwise IoU
/// exceeds `iou_threshold`.
///
/// The sort is stable, so among equal scores the earlier candidate wins.
/// Applying it to its own output changes nothing.
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::with_capacity(sorted.len());
    for det in sorted {
        if keep.iter().all(|k| k.rect.iou(&det.rect) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}
