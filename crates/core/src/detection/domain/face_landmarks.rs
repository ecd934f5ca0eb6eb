//! Sparse face landmarks with a semantic layout.
//!
//! Landmark models differ in how many points they regress; the layout names
//! which indices hold the five alignment anchors.

use serde::Serialize;

use crate::shared::error::{FaceError, Result};
use crate::shared::geometry::{AffineTransform, Point, Rect};

pub const LEFT_EYE: usize = 0;
pub const RIGHT_EYE: usize = 1;
pub const NOSE: usize = 2;
pub const MOUTH_LEFT: usize = 3;
pub const MOUTH_RIGHT: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LandmarkLayout {
    pub count: usize,
    /// Indices of [left eye, right eye, nose, left mouth, right mouth].
    pub key_points: [usize; 5],
}

impl LandmarkLayout {
    pub const FIVE_POINT: LandmarkLayout = LandmarkLayout {
        count: 5,
        key_points: [0, 1, 2, 3, 4],
    };

    pub fn new(count: usize, key_points: [usize; 5]) -> Result<Self> {
        if let Some(&bad) = key_points.iter().find(|&&k| k >= count) {
            return Err(FaceError::Configuration(format!(
                "key point index {bad} out of range for {count} landmarks"
            )));
        }
        Ok(Self { count, key_points })
    }
}

impl Default for LandmarkLayout {
    fn default() -> Self {
        Self::FIVE_POINT
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FaceLandmarks {
    points: Vec<Point>,
    #[serde(skip)]
    layout: LandmarkLayout,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Point>, layout: LandmarkLayout) -> Result<Self> {
        if points.len() != layout.count {
            return Err(FaceError::Configuration(format!(
                "expected {} landmarks, got {}",
                layout.count,
                points.len()
            )));
        }
        Ok(Self { points, layout })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn layout(&self) -> LandmarkLayout {
        self.layout
    }

    /// The alignment anchors in layout order.
    pub fn five_points(&self) -> [Point; 5] {
        self.layout.key_points.map(|i| self.points[i])
    }

    pub fn bounding_rect(&self) -> Rect {
        Rect::enclosing(&self.points).unwrap_or_default()
    }

    /// Same landmarks expressed through `transform`.
    pub fn transformed(&self, transform: &AffineTransform) -> FaceLandmarks {
        FaceLandmarks {
            points: self.points.iter().map(|&p| transform.apply(p)).collect(),
            layout: self.layout,
        }
    }
}
