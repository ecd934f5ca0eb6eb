use serde::Serialize;

use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::shared::geometry::Rect;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    /// Found by the detector this frame, not yet confirmed by refinement.
    NewlyDetected,
    Tracking,
    /// Terminal; lost faces are evicted from the tracked set.
    Lost,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskState {
    #[default]
    Unknown,
    Masked,
    Unmasked,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RgbLiveness {
    #[default]
    Unknown,
    Real,
    Fake,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionLiveness {
    #[default]
    Unknown,
    EyesOpen,
    EyesClosed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Age {
    #[default]
    Unknown,
    Years(f32),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    #[default]
    Unknown,
    Female,
    Male,
}

/// Secondary-analysis results. Each field is written by exactly one stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FaceAttributes {
    pub mask: MaskState,
    pub mask_score: Option<f32>,
    pub rgb_liveness: RgbLiveness,
    pub rgb_liveness_score: Option<f32>,
    pub interaction_liveness: InteractionLiveness,
    pub age: Age,
    pub gender: Gender,
}

/// A face followed across frames.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackedFace {
    pub track_id: u32,
    pub bounding_box: Rect,
    pub landmarks: FaceLandmarks,
    /// Refine-stage confidence; the detector score until first confirmed.
    pub quality_score: f32,
    pub landmark_confidence: f32,
    pub track_state: TrackState,
    pub frames_since_detection: usize,
    pub attributes: FaceAttributes,
}

impl TrackedFace {
    pub fn is_confirmed(&self) -> bool {
        self.track_state == TrackState::Tracking
    }
}
