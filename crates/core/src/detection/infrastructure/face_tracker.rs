//! Detection/tracking state machine.
//!
//! Every frame re-locates each tracked face from its last box (landmarks plus
//! refine verification). On the detection cadence, or whenever there is room
//! for more faces, the detector runs on a downscaled copy of the frame with
//! tracked regions blacked out, and new candidates fill the free slots.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::detection::domain::nms::{nms, Detection};
use crate::detection::domain::tracked_face::{FaceAttributes, TrackState, TrackedFace};
use crate::inference::infrastructure::engine_factory::EngineFactory;
use crate::inference::infrastructure::presets::ModelRole;
use crate::pipeline::alignment::aligned_face_box;
use crate::shared::constants::{
    DEFAULT_DETECTION_INTERVAL, DEFAULT_MAX_DETECTED_FACES, DEFAULT_NMS_THRESHOLD,
    DEFAULT_REFINE_THRESHOLD, DEFAULT_TRACK_MARGIN,
};
use crate::shared::error::{FaceError, Result};
use crate::shared::frame::{Frame, ImageSource};
use crate::shared::geometry::{AffineTransform, Rect};
use crate::shared::model_source::ModelSource;

use super::face_detector::FaceDetector;
use super::landmark_predictor::LandmarkPredictor;
use super::refine_scorer::RefineScorer;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub max_detected_faces: usize,
    /// Frames between detection passes once every slot is filled.
    pub detection_interval: usize,
    pub nms_threshold: f32,
    pub refine_threshold: f32,
    /// Extra context around a tracked box, per side, as a fraction of its
    /// long side.
    pub track_margin: f32,
    /// Fixed detector downscale; `None` fits the long side to the detector.
    pub detection_scale: Option<f32>,
    /// Candidates narrower or shorter than this (frame pixels) are ignored.
    pub min_face_size: f32,
    /// The tracked box is the region the aligned face crop covers, scaled by
    /// this about its center.
    pub landmark_box_scale: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_detected_faces: DEFAULT_MAX_DETECTED_FACES,
            detection_interval: DEFAULT_DETECTION_INTERVAL,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
            refine_threshold: DEFAULT_REFINE_THRESHOLD,
            track_margin: DEFAULT_TRACK_MARGIN,
            detection_scale: None,
            min_face_size: 0.0,
            landmark_box_scale: 1.0,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_detected_faces < 1 {
            return Err(FaceError::Configuration(
                "max_detected_faces must be at least 1".into(),
            ));
        }
        if self.detection_interval < 1 {
            return Err(FaceError::Configuration(
                "detection_interval must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("nms_threshold", self.nms_threshold),
            ("refine_threshold", self.refine_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(FaceError::Configuration(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.track_margin < 0.0 || self.min_face_size < 0.0 {
            return Err(FaceError::Configuration(
                "track_margin and min_face_size must not be negative".into(),
            ));
        }
        if self.landmark_box_scale <= 0.0 {
            return Err(FaceError::Configuration(format!(
                "landmark_box_scale must be positive, got {}",
                self.landmark_box_scale
            )));
        }
        if let Some(scale) = self.detection_scale {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(FaceError::Configuration(format!(
                    "detection_scale must be positive, got {scale}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct TrackerStats {
    pub frames: u64,
    pub detections: u64,
    pub last_detection_time: Duration,
    pub total_detection_time: Duration,
    /// Whole `update_stream` time, detection included.
    pub total_track_time: Duration,
}

impl TrackerStats {
    pub fn mean_frame_time(&self) -> Option<Duration> {
        u32::try_from(self.frames)
            .ok()
            .filter(|&n| n > 0)
            .map(|n| self.total_track_time / n)
    }
}

struct Step {
    faces: Vec<TrackedFace>,
    next_track_id: u32,
    detection_time: Option<Duration>,
}

pub struct FaceTracker {
    config: TrackerConfig,
    detector: FaceDetector,
    landmarks: LandmarkPredictor,
    refine: RefineScorer,
    faces: Vec<TrackedFace>,
    next_track_id: u32,
    frames_since_detect: usize,
    stats: TrackerStats,
}

impl FaceTracker {
    /// Loads the three mandatory stages; any of them failing is fatal.
    pub fn configure(
        source: &dyn ModelSource,
        factory: &dyn EngineFactory,
        config: TrackerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let detector = FaceDetector::load(
            factory,
            &*source.load_named_model(ModelRole::Detect.model_name())?,
        )?;
        let landmarks = LandmarkPredictor::load(
            factory,
            &*source.load_named_model(ModelRole::Landmark.model_name())?,
        )?;
        let refine = RefineScorer::load(
            factory,
            &*source.load_named_model(ModelRole::Refine.model_name())?,
        )?;
        Self::from_stages(detector, landmarks, refine, config)
    }

    pub fn from_stages(
        detector: FaceDetector,
        landmarks: LandmarkPredictor,
        refine: RefineScorer,
        config: TrackerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let frames_since_detect = config.detection_interval;
        Ok(Self {
            config,
            detector,
            landmarks,
            refine,
            faces: Vec::new(),
            next_track_id: 1,
            frames_since_detect,
            stats: TrackerStats::default(),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn tracked_faces(&self) -> &[TrackedFace] {
        &self.faces
    }

    /// Attribute writers get mutable access; the set itself stays owned here.
    pub fn faces_mut(&mut self) -> &mut [TrackedFace] {
        &mut self.faces
    }

    pub fn stats(&self) -> &TrackerStats {
        &self.stats
    }

    /// Forgets every face and counter. Track ids keep increasing.
    pub fn reset(&mut self) {
        self.faces.clear();
        self.frames_since_detect = self.config.detection_interval;
        self.stats = TrackerStats::default();
    }

    /// Advances the tracker by one frame.
    ///
    /// On error the tracked set and counters are left as they were.
    pub fn update_stream(
        &mut self,
        image: &dyn ImageSource,
        force_detect: bool,
    ) -> Result<&[TrackedFace]> {
        let start = Instant::now();
        let previous = std::mem::take(&mut self.faces);
        let step = match self.step(image, &previous, force_detect) {
            Ok(step) => step,
            Err(e) => {
                self.faces = previous;
                return Err(e);
            }
        };

        self.faces = step.faces;
        self.next_track_id = step.next_track_id;
        self.frames_since_detect = match step.detection_time {
            Some(_) => 0,
            None => self.frames_since_detect + 1,
        };
        self.stats.frames += 1;
        if let Some(elapsed) = step.detection_time {
            self.stats.detections += 1;
            self.stats.last_detection_time = elapsed;
            self.stats.total_detection_time += elapsed;
        }
        let elapsed = start.elapsed();
        self.stats.total_track_time += elapsed;
        log::debug!(
            "Frame tracked in {:.2} ms ({} faces, detection: {})",
            elapsed.as_secs_f64() * 1000.0,
            self.faces.len(),
            step.detection_time.is_some()
        );

        Ok(&self.faces)
    }

    /// Computes the next tracked set without committing it.
    fn step(
        &mut self,
        image: &dyn ImageSource,
        previous: &[TrackedFace],
        force_detect: bool,
    ) -> Result<Step> {
        let mut faces = Vec::with_capacity(previous.len());
        for face in previous {
            match self.track_face(image, face)? {
                Some(updated) => faces.push(updated),
                None => log::debug!("Track {} lost", face.track_id),
            }
        }

        let run_detection = force_detect
            || self.frames_since_detect + 1 >= self.config.detection_interval
            || faces.len() < self.config.max_detected_faces;
        let mut next_track_id = self.next_track_id;
        if !run_detection {
            return Ok(Step {
                faces,
                next_track_id,
                detection_time: None,
            });
        }

        let det_start = Instant::now();
        let candidates = self.detect_candidates(image, &faces)?;
        // Survivors were placed first; candidates fill what is left, best
        // first, and lose every tie against a survivor.
        let survivor_count = faces.len();
        for det in candidates {
            if faces.len() >= self.config.max_detected_faces {
                break;
            }
            if faces[..survivor_count]
                .iter()
                .any(|s| s.bounding_box.iou(&det.rect) >= self.config.nms_threshold)
            {
                continue;
            }
            faces.push(self.new_face(image, &det, next_track_id)?);
            next_track_id += 1;
        }
        Ok(Step {
            faces,
            next_track_id,
            detection_time: Some(det_start.elapsed()),
        })
    }

    /// Re-locates `face`, or `None` when it left the frame, failed
    /// verification or came back with degenerate landmarks.
    fn track_face(
        &mut self,
        image: &dyn ImageSource,
        face: &TrackedFace,
    ) -> Result<Option<TrackedFace>> {
        let region = face.bounding_box.square_with_margin(self.config.track_margin);
        let (fw, fh) = (image.frame_width() as f32, image.frame_height() as f32);
        if region.clip(fw, fh).is_empty() {
            return Ok(None);
        }

        let (landmarks, confidence, crop) = self.locate_landmarks(image, &region)?;
        let score = self.refine.score(&crop)?;
        if score < self.config.refine_threshold {
            log::debug!(
                "Track {} refine score {score:.3} below {}",
                face.track_id,
                self.config.refine_threshold
            );
            return Ok(None);
        }

        let face_box = match aligned_face_box(&landmarks) {
            Ok(b) => b,
            Err(e) => {
                log::debug!("Track {} has unusable landmarks: {e}", face.track_id);
                return Ok(None);
            }
        };

        Ok(Some(TrackedFace {
            bounding_box: face_box.scaled_about_center(self.config.landmark_box_scale),
            landmarks,
            quality_score: score,
            landmark_confidence: confidence,
            track_state: TrackState::Tracking,
            frames_since_detection: face.frames_since_detection + 1,
            ..face.clone()
        }))
    }

    /// Runs the detector with tracked regions masked out; NMS-filtered
    /// candidates in frame coordinates, best first.
    fn detect_candidates(
        &mut self,
        image: &dyn ImageSource,
        survivors: &[TrackedFace],
    ) -> Result<Vec<Detection>> {
        let (in_w, in_h) = self.detector.input_size()?;
        let long_side = image.frame_width().max(image.frame_height()).max(1) as f32;
        let scale = self
            .config
            .detection_scale
            .unwrap_or_else(|| (in_w.max(in_h) as f32 / long_side).min(1.0));

        let mut scaled = image.scaled_image(scale, true)?;
        for face in survivors {
            let region = face.bounding_box.square_with_margin(self.config.track_margin);
            scaled.fill_rect(&region.scaled(scale), 0);
        }

        let raw = self.detector.detect(&scaled)?;
        let min_size = self.config.min_face_size;
        Ok(nms(&raw, self.config.nms_threshold)
            .into_iter()
            .map(|d| Detection::new(d.rect.scaled(1.0 / scale), d.score))
            .filter(|d| d.rect.width >= min_size && d.rect.height >= min_size)
            .collect())
    }

    fn new_face(
        &mut self,
        image: &dyn ImageSource,
        det: &Detection,
        track_id: u32,
    ) -> Result<TrackedFace> {
        let region = det.rect.square_with_margin(self.config.track_margin);
        let (landmarks, confidence, _) = self.locate_landmarks(image, &region)?;
        Ok(TrackedFace {
            track_id,
            bounding_box: det.rect,
            landmarks,
            quality_score: det.score,
            landmark_confidence: confidence,
            track_state: TrackState::NewlyDetected,
            frames_since_detection: 0,
            attributes: FaceAttributes::default(),
        })
    }

    /// Crops `region` to the landmark input and predicts; landmarks come back
    /// in frame coordinates together with the crop itself.
    fn locate_landmarks(
        &mut self,
        image: &dyn ImageSource,
        region: &Rect,
    ) -> Result<(FaceLandmarks, f32, Frame)> {
        let (lw, lh) = self.landmarks.input_size()?;
        let to_crop = AffineTransform::region_to_canvas(region, lw, lh);
        let to_frame = to_crop.invert().ok_or_else(|| {
            FaceError::Execution(format!("degenerate tracking region {region:?}"))
        })?;
        let crop = image.affine_crop(&to_crop, lw, lh)?;
        let (points, confidence) = self.landmarks.predict(&crop)?;
        let landmarks = FaceLandmarks::new(points, self.landmarks.layout())?.transformed(&to_frame);
        Ok((landmarks, confidence, crop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::alignment::ALIGNMENT_TEMPLATE;
    use crate::shared::constants::ALIGNED_FACE_SIZE;
    use crate::shared::frame::PixelFormat;
    use crate::test_support::{FakeEngineFactory, FakeOutput};
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const SIZE: u32 = 160;

    /// Template points spread over `(x, y, w, h)` of a crop, normalized to the
    /// crop side.
    fn template_points(x: f32, y: f32, w: f32, h: f32, side: f32) -> Vec<f32> {
        let t = ALIGNED_FACE_SIZE as f32;
        ALIGNMENT_TEMPLATE
            .iter()
            .flat_map(|p| [(x + p.x / t * w) / side, (y + p.y / t * h) / side])
            .collect()
    }

    /// Places the face exactly on the crop, so a box tracked with no margin
    /// stays where it is.
    fn whole_crop_landmarks(_: &[f32]) -> Vec<FakeOutput> {
        vec![FakeOutput::new(vec![1, 10], template_points(0.0, 0.0, 1.0, 1.0, 1.0))]
    }

    /// Finds the bright square in the normalized landmark crop and puts the
    /// face there.
    fn locating_landmarks(input: &[f32]) -> Vec<FakeOutput> {
        let side = ALIGNED_FACE_SIZE as usize;
        let (mut x1, mut y1, mut x2, mut y2) = (side, side, 0, 0);
        for y in 0..side {
            for x in 0..side {
                if input[y * side + x] > 0.0 {
                    x1 = x1.min(x);
                    y1 = y1.min(y);
                    x2 = x2.max(x + 1);
                    y2 = y2.max(y + 1);
                }
            }
        }
        let (w, h) = (x2.saturating_sub(x1) as f32, y2.saturating_sub(y1) as f32);
        let data = template_points(x1 as f32, y1 as f32, w, h, side as f32);
        vec![FakeOutput::new(vec![1, 10], data)]
    }

    /// `[cx, cy, side, score]` per face, in detector pixels (= frame pixels
    /// for a 160x160 frame).
    type Boxes = Arc<Mutex<Vec<[f32; 4]>>>;

    struct Harness {
        boxes: Boxes,
        refine: Arc<Mutex<f32>>,
        detector_inputs: Arc<Mutex<Vec<Vec<f32>>>>,
    }

    fn harness(config: TrackerConfig) -> (FaceTracker, Harness) {
        harness_with(FakeEngineFactory::new(), config)
    }

    fn harness_with(base: FakeEngineFactory, config: TrackerConfig) -> (FaceTracker, Harness) {
        let h = Harness {
            boxes: Arc::new(Mutex::new(Vec::new())),
            refine: Arc::new(Mutex::new(0.9)),
            detector_inputs: Arc::new(Mutex::new(Vec::new())),
        };
        let boxes = Arc::clone(&h.boxes);
        let inputs = Arc::clone(&h.detector_inputs);
        let refine = Arc::clone(&h.refine);
        let mut factory = base;
        if !factory.has_model("face_detect") {
            factory = factory.with_model("face_detect", move |input| {
                inputs.lock().unwrap().push(input.to_vec());
                let boxes = boxes.lock().unwrap();
                let data = boxes
                    .iter()
                    .flat_map(|&[cx, cy, side, score]| [cx, cy, side, side, score])
                    .collect();
                vec![FakeOutput::new(vec![1, boxes.len(), 5], data)]
            });
        }
        if !factory.has_model("landmark") {
            factory = factory.with_model("landmark", whole_crop_landmarks);
        }
        if !factory.has_model("refine_net") {
            factory = factory.with_model("refine_net", move |_| {
                let score = *refine.lock().unwrap();
                vec![FakeOutput::new(vec![1, 2], vec![1.0 - score, score])]
            });
        }
        let source = factory.model_source();
        let tracker = FaceTracker::configure(&source, &factory, config).unwrap();
        (tracker, h)
    }

    fn tracking_config(max_faces: usize) -> TrackerConfig {
        TrackerConfig {
            max_detected_faces: max_faces,
            detection_interval: 100,
            track_margin: 0.0,
            ..Default::default()
        }
    }

    fn white() -> Frame {
        Frame::new(
            vec![255; (SIZE * SIZE * 3) as usize],
            SIZE,
            SIZE,
            PixelFormat::Rgb,
            0,
        )
        .unwrap()
    }

    /// Black frame with a white `side` square at `(x, y)`.
    fn square_on_black(x: u32, y: u32, side: u32) -> Frame {
        let mut frame = Frame::blank(SIZE, SIZE, PixelFormat::Rgb);
        frame.fill_rect(&Rect::new(x as f32, y as f32, side as f32, side as f32), 255);
        frame
    }

    #[test]
    fn test_config_defaults_and_validation() {
        let config: TrackerConfig = serde_json::from_str(r#"{"max_detected_faces": 4}"#).unwrap();
        assert_eq!(config.max_detected_faces, 4);
        assert_eq!(config.detection_interval, DEFAULT_DETECTION_INTERVAL);
        assert!(config.validate().is_ok());

        let zero_interval = TrackerConfig {
            detection_interval: 0,
            ..Default::default()
        };
        assert!(zero_interval.validate().unwrap_err().is_configuration());
        let bad_threshold = TrackerConfig {
            nms_threshold: 1.5,
            ..Default::default()
        };
        assert!(bad_threshold.validate().is_err());
    }

    #[test]
    fn test_no_faces_is_empty_not_error() {
        let (mut tracker, _h) = harness(TrackerConfig::default());
        assert!(tracker.update_stream(&white(), false).unwrap().is_empty());
        assert_eq!(tracker.stats().frames, 1);
        assert_eq!(tracker.stats().detections, 1);
    }

    #[test]
    fn test_detected_face_is_confirmed_on_next_frame() {
        let (mut tracker, h) = harness(tracking_config(1));
        h.boxes.lock().unwrap().push([80.0, 80.0, 40.0, 0.9]);

        let faces = tracker.update_stream(&white(), false).unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].track_id, 1);
        assert_eq!(faces[0].track_state, TrackState::NewlyDetected);
        assert_eq!(faces[0].bounding_box, Rect::new(60.0, 60.0, 40.0, 40.0));

        let faces = tracker.update_stream(&white(), false).unwrap();
        assert_eq!(faces.len(), 1);
        let face = &faces[0];
        assert_eq!(face.track_id, 1);
        assert!(face.is_confirmed());
        assert_eq!(face.frames_since_detection, 1);
        assert!((face.quality_score - 0.9).abs() < 1e-6);
        assert!((face.bounding_box.x - 60.0).abs() < 1e-2);
        assert!((face.bounding_box.width - 40.0).abs() < 1e-2);
        // Slot full and interval not reached: only the first frame detected.
        assert_eq!(tracker.stats().detections, 1);
    }

    #[test]
    fn test_low_refine_score_loses_face() {
        let (mut tracker, h) = harness(tracking_config(1));
        h.boxes.lock().unwrap().push([80.0, 80.0, 40.0, 0.9]);
        tracker.update_stream(&white(), false).unwrap();

        h.boxes.lock().unwrap().clear();
        *h.refine.lock().unwrap() = 0.2;
        let faces = tracker.update_stream(&white(), false).unwrap();
        assert!(faces.iter().all(|f| f.track_id != 1));
        assert!(faces.is_empty());
    }

    #[test]
    fn test_cap_admits_best_candidates() {
        let (mut tracker, h) = harness(tracking_config(2));
        h.boxes.lock().unwrap().extend([
            [20.0, 20.0, 20.0, 0.6],
            [80.0, 80.0, 20.0, 0.95],
            [140.0, 140.0, 20.0, 0.8],
        ]);
        let faces = tracker.update_stream(&white(), false).unwrap();
        assert_eq!(faces.len(), 2);
        assert!((faces[0].quality_score - 0.95).abs() < 1e-6);
        assert!((faces[1].quality_score - 0.8).abs() < 1e-6);
        assert_eq!((faces[0].track_id, faces[1].track_id), (1, 2));

        for _ in 0..3 {
            let faces = tracker.update_stream(&white(), true).unwrap();
            assert!(faces.len() <= 2);
        }
    }

    #[test]
    fn test_tracked_region_excluded_from_detection() {
        let (mut tracker, h) = harness(tracking_config(2));
        h.boxes.lock().unwrap().push([80.0, 80.0, 40.0, 0.9]);
        tracker.update_stream(&white(), false).unwrap();

        // One slot is still free, so the detector runs again and reports the
        // same face; it must not be admitted twice.
        let faces = tracker.update_stream(&white(), false).unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].track_id, 1);
        assert_eq!(tracker.stats().detections, 2);

        let inputs = h.detector_inputs.lock().unwrap();
        let center = (80 * SIZE + 80) as usize;
        assert!(inputs[0][center] > 0.9);
        assert_eq!(inputs[1][center], 0.0);
    }

    #[test]
    fn test_face_leaving_frame_is_lost() {
        let (mut tracker, h) = harness(tracking_config(1));
        h.boxes.lock().unwrap().push([80.0, 80.0, 40.0, 0.9]);
        tracker.update_stream(&white(), false).unwrap();
        h.boxes.lock().unwrap().clear();
        tracker.faces_mut()[0].bounding_box = Rect::new(500.0, 500.0, 40.0, 40.0);
        assert!(tracker.update_stream(&white(), false).unwrap().is_empty());
    }

    #[test]
    fn test_failed_update_keeps_previous_state() {
        let base = FakeEngineFactory::new().with_failing_process("refine_net");
        let (mut tracker, h) = harness_with(base, tracking_config(1));
        h.boxes.lock().unwrap().push([80.0, 80.0, 40.0, 0.9]);
        let before = tracker.update_stream(&white(), false).unwrap().to_vec();

        let err = tracker.update_stream(&white(), false).unwrap_err();
        assert!(matches!(err, FaceError::Execution(_)));
        assert_eq!(tracker.tracked_faces(), before.as_slice());
        assert_eq!(tracker.stats().frames, 1);
    }

    #[test]
    fn test_reset_clears_faces_but_not_ids() {
        let (mut tracker, h) = harness(tracking_config(1));
        h.boxes.lock().unwrap().push([80.0, 80.0, 40.0, 0.9]);
        tracker.update_stream(&white(), false).unwrap();
        tracker.reset();
        assert!(tracker.tracked_faces().is_empty());
        assert_eq!(tracker.stats().frames, 0);
        let faces = tracker.update_stream(&white(), false).unwrap();
        assert_eq!(faces[0].track_id, 2);
    }

    #[test]
    fn test_missing_mandatory_model_is_fatal() {
        let factory = FakeEngineFactory::new()
            .with_model("face_detect", |_| vec![])
            .with_model("landmark", |_| vec![]);
        let source = factory.model_source();
        let err = FaceTracker::configure(&source, &factory, TrackerConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, FaceError::ModelNotFound(_)));
    }

    #[test]
    fn test_stationary_face_keeps_its_box() {
        let base = FakeEngineFactory::new().with_model("landmark", locating_landmarks);
        let config = TrackerConfig {
            max_detected_faces: 1,
            detection_interval: 100,
            ..Default::default()
        };
        let (mut tracker, h) = harness_with(base, config);
        h.boxes.lock().unwrap().push([80.0, 80.0, 40.0, 0.9]);
        let frame = square_on_black(60, 60, 40);

        for i in 0..10 {
            let faces = tracker.update_stream(&frame, false).unwrap();
            assert_eq!(faces.len(), 1, "frame {i}");
            let face = &faces[0];
            assert_eq!(face.track_id, 1);
            assert_eq!(face.frames_since_detection, i);
            let b = face.bounding_box;
            for (got, want) in [(b.x, 60.0), (b.y, 60.0), (b.width, 40.0), (b.height, 40.0)] {
                assert!((got - want).abs() < 2.0, "frame {i}: {b:?}");
            }
        }
        assert_eq!(tracker.stats().detections, 1);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[case(5)]
    fn test_full_tracker_detects_every_interval(#[case] interval: usize) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let base = FakeEngineFactory::new().with_model("face_detect", move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            vec![FakeOutput::new(vec![1, 1, 5], vec![80.0, 80.0, 40.0, 40.0, 0.9])]
        });
        let config = TrackerConfig {
            max_detected_faces: 1,
            detection_interval: interval,
            track_margin: 0.0,
            ..Default::default()
        };
        let (mut tracker, _h) = harness_with(base, config);

        tracker.update_stream(&white(), false).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for _ in 1..interval {
            tracker.update_stream(&white(), false).unwrap();
        }
        // interval - 1 frames after the first pass: not yet.
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let faces = tracker.update_stream(&white(), false).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // The re-detected face is the tracked one and keeps its age.
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].track_id, 1);
        assert_eq!(faces[0].frames_since_detection, interval);

        for _ in 0..2 * interval {
            tracker.update_stream(&white(), false).unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(tracker.stats().detections, 4);
    }

    #[test]
    fn test_force_detect_overrides_interval() {
        let (mut tracker, h) = harness(tracking_config(1));
        h.boxes.lock().unwrap().push([80.0, 80.0, 40.0, 0.9]);
        tracker.update_stream(&white(), false).unwrap();
        tracker.update_stream(&white(), false).unwrap();
        assert_eq!(h.detector_inputs.lock().unwrap().len(), 1);
        tracker.update_stream(&white(), true).unwrap();
        assert_eq!(h.detector_inputs.lock().unwrap().len(), 2);
    }
}
