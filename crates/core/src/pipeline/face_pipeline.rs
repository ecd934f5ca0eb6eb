use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::detection::domain::tracked_face::{
    Age, FaceAttributes, Gender, InteractionLiveness, MaskState, RgbLiveness, TrackedFace,
};
use crate::inference::infrastructure::engine_factory::EngineFactory;
use crate::inference::infrastructure::presets::ModelRole;
use crate::shared::constants::{
    AGE_SCALE, INTERACTION_THRESHOLD, LIVENESS_BOX_SCALE, MASK_THRESHOLD, RGB_LIVENESS_THRESHOLD,
};
use crate::shared::error::{FaceError, Result};
use crate::shared::frame::{Frame, ImageSource};
use crate::shared::geometry::{AffineTransform, Rect};
use crate::shared::model_source::ModelSource;

use super::alignment::aligned_crop;
use super::capability::Capability;
use super::classifiers::Classifier;

/// Which analysis stages to load, and how their scores become attributes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub liveness: bool,
    pub mask_detect: bool,
    pub age: bool,
    pub gender: bool,
    pub interaction_liveness: bool,
    pub mask_threshold: f32,
    pub rgb_liveness_threshold: f32,
    pub interaction_threshold: f32,
    /// RGB liveness looks at the face box scaled by this about its center.
    pub liveness_box_scale: f32,
    /// Age models regress `years / age_scale`.
    pub age_scale: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            liveness: false,
            mask_detect: false,
            age: false,
            gender: false,
            interaction_liveness: false,
            mask_threshold: MASK_THRESHOLD,
            rgb_liveness_threshold: RGB_LIVENESS_THRESHOLD,
            interaction_threshold: INTERACTION_THRESHOLD,
            liveness_box_scale: LIVENESS_BOX_SCALE,
            age_scale: AGE_SCALE,
        }
    }
}

impl PipelineConfig {
    pub fn enables(&self, capability: Capability) -> bool {
        match capability {
            Capability::Mask => self.mask_detect,
            Capability::RgbLiveness => self.liveness,
            Capability::InteractionLiveness => self.interaction_liveness,
            Capability::Age => self.age,
            Capability::Gender => self.gender,
        }
    }

    pub fn enable(&mut self, capability: Capability) {
        let flag = match capability {
            Capability::Mask => &mut self.mask_detect,
            Capability::RgbLiveness => &mut self.liveness,
            Capability::InteractionLiveness => &mut self.interaction_liveness,
            Capability::Age => &mut self.age,
            Capability::Gender => &mut self.gender,
        };
        *flag = true;
    }

    pub fn requested(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|&c| self.enables(c))
            .collect()
    }
}

/// Outcome of one `process` call: raw scores of the stages that ran and the
/// error of each that did not.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub scores: Vec<(Capability, f32)>,
    pub failures: Vec<(Capability, FaceError)>,
}

impl PipelineReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn score(&self, capability: Capability) -> Option<f32> {
        self.scores
            .iter()
            .find(|(c, _)| *c == capability)
            .map(|&(_, s)| s)
    }
}

fn model_role(capability: Capability) -> ModelRole {
    match capability {
        Capability::Mask => ModelRole::Mask,
        Capability::RgbLiveness => ModelRole::RgbLiveness,
        Capability::InteractionLiveness => ModelRole::InteractionLiveness,
        Capability::Age => ModelRole::Age,
        Capability::Gender => ModelRole::Gender,
    }
}

/// Per-face secondary analysis.
///
/// Stages that fail to load are logged and stay disabled; the pipeline
/// itself is always constructed.
pub struct FacePipeline {
    config: PipelineConfig,
    stages: BTreeMap<Capability, Classifier>,
}

impl FacePipeline {
    pub fn new(
        source: &dyn ModelSource,
        factory: &dyn EngineFactory,
        config: PipelineConfig,
    ) -> Self {
        let mut stages = BTreeMap::new();
        for capability in config.requested() {
            let role = model_role(capability);
            let loaded = source
                .load_named_model(role.model_name())
                .and_then(|blob| Classifier::load(factory, &blob, role));
            match loaded {
                Ok(stage) => {
                    stages.insert(capability, stage);
                }
                Err(e) => log::error!("Failed to initialize {capability} stage: {e}"),
            }
        }
        Self { config, stages }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_enabled(&self, capability: Capability) -> bool {
        self.stages.contains_key(&capability)
    }

    /// Raw score of one stage for `face`, without touching its attributes.
    pub fn run_stage(
        &mut self,
        image: &dyn ImageSource,
        face: &TrackedFace,
        capability: Capability,
    ) -> Result<f32> {
        let mut aligned = None;
        self.score(image, face, capability, &mut aligned)
    }

    /// Runs each requested stage and writes the resulting attributes.
    ///
    /// A failing stage leaves its attribute Unknown and does not stop the
    /// others.
    pub fn process(
        &mut self,
        image: &dyn ImageSource,
        face: &mut TrackedFace,
        capabilities: &[Capability],
    ) -> PipelineReport {
        let mut report = PipelineReport::default();
        let mut aligned = None;
        for &capability in capabilities {
            match self.score(image, face, capability, &mut aligned) {
                Ok(score) => {
                    self.apply(capability, score, &mut face.attributes);
                    report.scores.push((capability, score));
                }
                Err(e) => {
                    log::warn!("Track {} {capability} failed: {e}", face.track_id);
                    clear(capability, &mut face.attributes);
                    report.failures.push((capability, e));
                }
            }
        }
        report
    }

    fn score(
        &mut self,
        image: &dyn ImageSource,
        face: &TrackedFace,
        capability: Capability,
        aligned: &mut Option<Frame>,
    ) -> Result<f32> {
        let stage = self
            .stages
            .get_mut(&capability)
            .ok_or(FaceError::UninitializedCapability(capability))?;

        if capability.uses_aligned_crop() {
            let crop = match aligned.take() {
                Some(crop) => crop,
                None => aligned_crop(image, &face.landmarks)?,
            };
            return stage.score(aligned.insert(crop));
        }

        let (w, h) = stage.input_size()?;
        let crop = expanded_crop(image, &face.bounding_box, self.config.liveness_box_scale, w, h)?;
        stage.score(&crop)
    }

    fn apply(&self, capability: Capability, score: f32, attributes: &mut FaceAttributes) {
        let config = &self.config;
        match capability {
            Capability::Mask => {
                attributes.mask = if score > config.mask_threshold {
                    MaskState::Masked
                } else {
                    MaskState::Unmasked
                };
                attributes.mask_score = Some(score);
            }
            Capability::RgbLiveness => {
                attributes.rgb_liveness = if score > config.rgb_liveness_threshold {
                    RgbLiveness::Real
                } else {
                    RgbLiveness::Fake
                };
                attributes.rgb_liveness_score = Some(score);
            }
            Capability::InteractionLiveness => {
                attributes.interaction_liveness = if score > config.interaction_threshold {
                    InteractionLiveness::EyesOpen
                } else {
                    InteractionLiveness::EyesClosed
                };
            }
            Capability::Age => attributes.age = Age::Years(score * config.age_scale),
            // Female probability of a two-way softmax; ties go to female.
            Capability::Gender => {
                attributes.gender = if score >= 0.5 {
                    Gender::Female
                } else {
                    Gender::Male
                };
            }
        }
    }
}

fn clear(capability: Capability, attributes: &mut FaceAttributes) {
    match capability {
        Capability::Mask => {
            attributes.mask = MaskState::Unknown;
            attributes.mask_score = None;
        }
        Capability::RgbLiveness => {
            attributes.rgb_liveness = RgbLiveness::Unknown;
            attributes.rgb_liveness_score = None;
        }
        Capability::InteractionLiveness => {
            attributes.interaction_liveness = InteractionLiveness::Unknown
        }
        Capability::Age => attributes.age = Age::Unknown,
        Capability::Gender => attributes.gender = Gender::Unknown,
    }
}

/// The face box scaled about its center, clipped to the frame, resampled to
/// `width` x `height`.
fn expanded_crop(
    image: &dyn ImageSource,
    bbox: &Rect,
    scale: f32,
    width: u32,
    height: u32,
) -> Result<Frame> {
    let region = bbox
        .scaled_about_center(scale)
        .clip(image.frame_width() as f32, image.frame_height() as f32);
    if region.is_empty() {
        return Err(FaceError::Execution(format!(
            "face box {bbox:?} lies outside the frame"
        )));
    }
    image.affine_crop(&AffineTransform::region_to_canvas(&region, width, height), width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_landmarks::{FaceLandmarks, LandmarkLayout};
    use crate::detection::domain::tracked_face::TrackState;
    use crate::pipeline::alignment::ALIGNMENT_TEMPLATE;
    use crate::shared::frame::PixelFormat;
    use crate::shared::geometry::Point;
    use crate::test_support::{FakeEngineFactory, FakeOutput};
    use approx::assert_relative_eq;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn face() -> TrackedFace {
        let points = ALIGNMENT_TEMPLATE.map(|p| Point::new(p.x + 40.0, p.y + 30.0));
        TrackedFace {
            track_id: 7,
            bounding_box: Rect::new(60.0, 60.0, 80.0, 80.0),
            landmarks: FaceLandmarks::new(points.to_vec(), LandmarkLayout::FIVE_POINT).unwrap(),
            quality_score: 0.9,
            landmark_confidence: 1.0,
            track_state: TrackState::Tracking,
            frames_since_detection: 3,
            attributes: FaceAttributes::default(),
        }
    }

    fn frame() -> Frame {
        Frame::blank(200, 200, PixelFormat::Bgr)
    }

    fn constant(values: Vec<f32>) -> impl Fn(&[f32]) -> Vec<FakeOutput> + Send + Sync {
        move |_: &[f32]| vec![FakeOutput::new(vec![1, values.len()], values.clone())]
    }

    fn pipeline(factory: &FakeEngineFactory, config: PipelineConfig) -> FacePipeline {
        FacePipeline::new(&factory.model_source(), factory, config)
    }

    fn all_enabled() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        for cap in Capability::ALL {
            config.enable(cap);
        }
        config
    }

    #[rstest]
    #[case(0.97, MaskState::Masked)]
    #[case(0.80, MaskState::Unmasked)]
    fn test_mask_threshold(#[case] score: f32, #[case] expected: MaskState) {
        let factory =
            FakeEngineFactory::new().with_model("mask_detect", constant(vec![score, 1.0 - score]));
        let mut config = PipelineConfig::default();
        config.enable(Capability::Mask);
        let mut pipeline = pipeline(&factory, config);
        let mut face = face();
        let report = pipeline.process(&frame(), &mut face, &[Capability::Mask]);
        assert!(report.is_ok());
        assert_eq!(face.attributes.mask, expected);
        assert_eq!(face.attributes.mask_score, Some(score));
    }

    #[rstest]
    #[case(0.92, RgbLiveness::Real)]
    #[case(0.5, RgbLiveness::Fake)]
    fn test_rgb_liveness_threshold(#[case] score: f32, #[case] expected: RgbLiveness) {
        let factory = FakeEngineFactory::new()
            .with_model("rgb_anti_spoofing", constant(vec![1.0 - score, score]));
        let mut config = PipelineConfig::default();
        config.enable(Capability::RgbLiveness);
        let mut pipeline = pipeline(&factory, config);
        let mut face = face();
        pipeline.process(&frame(), &mut face, &[Capability::RgbLiveness]);
        assert_eq!(face.attributes.rgb_liveness, expected);
    }

    #[test]
    fn test_disabled_capability_is_uninitialized() {
        let factory = FakeEngineFactory::new().with_model("mask_detect", constant(vec![0.99]));
        let mut pipeline = pipeline(&factory, PipelineConfig::default());
        assert!(!pipeline.is_enabled(Capability::Mask));

        let err = pipeline
            .run_stage(&frame(), &face(), Capability::Mask)
            .unwrap_err();
        assert!(matches!(err, FaceError::UninitializedCapability(Capability::Mask)));

        let mut face = face();
        let report = pipeline.process(&frame(), &mut face, &[Capability::Mask]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(face.attributes.mask, MaskState::Unknown);
    }

    #[test]
    fn test_failed_init_disables_only_that_stage() {
        let factory = FakeEngineFactory::new()
            .with_failing_init("mask_detect")
            .with_model("age_predict", constant(vec![0.31]));
        let mut config = PipelineConfig::default();
        config.enable(Capability::Mask);
        config.enable(Capability::Age);
        let pipeline = pipeline(&factory, config);
        assert!(!pipeline.is_enabled(Capability::Mask));
        assert!(pipeline.is_enabled(Capability::Age));
        // Missing model file behaves the same way.
        assert!(!pipeline.is_enabled(Capability::Gender));
    }

    #[test]
    fn test_process_continues_after_failure() {
        let factory = FakeEngineFactory::new()
            .with_failing_process("mask_detect")
            .with_model("rgb_anti_spoofing", constant(vec![0.05, 0.95]))
            .with_model("interaction_liveness", constant(vec![0.1, 0.9]))
            .with_model("age_predict", constant(vec![0.31]))
            .with_model("gender_predict", constant(vec![0.2, 0.8]));
        let mut pipeline = pipeline(&factory, all_enabled());
        let mut face = face();
        face.attributes.mask = MaskState::Masked;

        let report = pipeline.process(&frame(), &mut face, &Capability::ALL);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, Capability::Mask);
        assert_eq!(report.scores.len(), 4);

        let attrs = &face.attributes;
        assert_eq!(attrs.mask, MaskState::Unknown);
        assert_eq!(attrs.rgb_liveness, RgbLiveness::Real);
        assert_eq!(attrs.interaction_liveness, InteractionLiveness::EyesOpen);
        assert_eq!(attrs.gender, Gender::Male);
        match attrs.age {
            Age::Years(years) => assert_relative_eq!(years, 31.0, epsilon = 1e-4),
            Age::Unknown => panic!("age not written"),
        }
    }

    #[test]
    fn test_unrequested_stage_not_invoked() {
        let mask_runs = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&mask_runs);
        let factory = FakeEngineFactory::new()
            .with_model("mask_detect", move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
                vec![FakeOutput::new(vec![1], vec![0.99])]
            })
            .with_model("gender_predict", constant(vec![0.9, 0.1]));
        let mut config = PipelineConfig::default();
        config.enable(Capability::Mask);
        config.enable(Capability::Gender);
        let mut pipeline = pipeline(&factory, config);
        let mut face = face();
        let report = pipeline.process(&frame(), &mut face, &[Capability::Gender]);
        assert_eq!(report.score(Capability::Gender), Some(0.9));
        assert_eq!(face.attributes.gender, Gender::Female);
        assert_eq!(face.attributes.mask, MaskState::Unknown);
        assert_eq!(mask_runs.load(Ordering::SeqCst), 0);

        pipeline.process(&frame(), &mut face, &[Capability::Mask]);
        assert_eq!(mask_runs.load(Ordering::SeqCst), 1);
        assert_eq!(face.attributes.mask, MaskState::Masked);
    }

    #[test]
    fn test_liveness_box_outside_frame_fails() {
        let factory = FakeEngineFactory::new()
            .with_model("rgb_anti_spoofing", constant(vec![0.0, 1.0]));
        let mut config = PipelineConfig::default();
        config.enable(Capability::RgbLiveness);
        let mut pipeline = pipeline(&factory, config);
        let mut face = face();
        face.bounding_box = Rect::new(1000.0, 1000.0, 10.0, 10.0);
        let err = pipeline
            .run_stage(&frame(), &face, Capability::RgbLiveness)
            .unwrap_err();
        assert!(matches!(err, FaceError::Execution(_)));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"mask_detect": true, "mask_threshold": 0.9}"#).unwrap();
        assert_eq!(config.requested(), vec![Capability::Mask]);
        assert_eq!(config.mask_threshold, 0.9);
        assert_eq!(config.rgb_liveness_threshold, RGB_LIVENESS_THRESHOLD);
    }
}
