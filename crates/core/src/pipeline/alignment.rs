//! Five-point face alignment onto the canonical 112x112 template.

use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::shared::constants::ALIGNED_FACE_SIZE;
use crate::shared::error::{FaceError, Result};
use crate::shared::frame::{Frame, ImageSource};
use crate::shared::geometry::{AffineTransform, Point, Rect};

/// Eye, nose and mouth-corner positions of an upright face in a 112x112 crop.
pub const ALIGNMENT_TEMPLATE: [Point; 5] = [
    Point::new(38.2946, 51.6963),
    Point::new(73.5318, 51.5014),
    Point::new(56.0252, 71.7366),
    Point::new(41.5493, 92.3655),
    Point::new(70.7299, 92.2041),
];

/// Least-squares similarity (rotation, uniform scale, translation) mapping
/// `src` onto `dst`, after Umeyama. `None` when `src` points coincide.
pub fn similarity_transform(src: &[Point; 5], dst: &[Point; 5]) -> Option<AffineTransform> {
    let n = src.len() as f64;
    let mean = |pts: &[Point; 5]| {
        let (sx, sy) = pts
            .iter()
            .fold((0.0f64, 0.0f64), |(x, y), p| (x + p.x as f64, y + p.y as f64));
        (sx / n, sy / n)
    };
    let (smx, smy) = mean(src);
    let (dmx, dmy) = mean(dst);

    let (mut dot, mut cross, mut var) = (0.0f64, 0.0f64, 0.0f64);
    for (s, d) in src.iter().zip(dst) {
        let (sx, sy) = (s.x as f64 - smx, s.y as f64 - smy);
        let (dx, dy) = (d.x as f64 - dmx, d.y as f64 - dmy);
        dot += sx * dx + sy * dy;
        cross += sx * dy - sy * dx;
        var += sx * sx + sy * sy;
    }
    if var < 1e-9 {
        return None;
    }

    let a = dot / var;
    let b = cross / var;
    let tx = dmx - (a * smx - b * smy);
    let ty = dmy - (b * smx + a * smy);
    Some(AffineTransform::new([
        [a as f32, -b as f32, tx as f32],
        [b as f32, a as f32, ty as f32],
    ]))
}

/// Frame-to-template transform for `landmarks`.
pub fn alignment_transform(landmarks: &FaceLandmarks) -> Result<AffineTransform> {
    similarity_transform(&landmarks.five_points(), &ALIGNMENT_TEMPLATE)
        .ok_or_else(|| FaceError::Execution("degenerate landmarks, cannot align face".into()))
}

/// The aligned `ALIGNED_FACE_SIZE` square crop of the face.
pub fn aligned_crop(image: &dyn ImageSource, landmarks: &FaceLandmarks) -> Result<Frame> {
    let transform = alignment_transform(landmarks)?;
    image.affine_crop(&transform, ALIGNED_FACE_SIZE, ALIGNED_FACE_SIZE)
}

/// The frame region the aligned crop covers: the template square mapped back
/// through the inverse alignment.
pub fn aligned_face_box(landmarks: &FaceLandmarks) -> Result<Rect> {
    let to_frame = alignment_transform(landmarks)?
        .invert()
        .ok_or_else(|| FaceError::Execution("alignment transform is not invertible".into()))?;
    let s = ALIGNED_FACE_SIZE as f32;
    let corners = [(0.0, 0.0), (s, 0.0), (0.0, s), (s, s)].map(|(x, y)| to_frame.apply(Point::new(x, y)));
    Rect::enclosing(&corners)
        .ok_or_else(|| FaceError::Execution("empty aligned face box".into()))
}
