//! The public face of the engine: one tracker plus one analysis pipeline
//! bound to a backend.

use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::detection::domain::tracked_face::TrackedFace;
use crate::detection::infrastructure::face_tracker::{FaceTracker, TrackerConfig, TrackerStats};
use crate::inference::domain::tensor_engine::BackendKind;
use crate::inference::infrastructure::engine_factory::{EngineFactory, OrtEngineFactory};
use crate::shared::error::{FaceError, Result};
use crate::shared::frame::{Frame, ImageSource};
use crate::shared::model_source::ModelSource;

use super::capability::Capability;
use super::face_pipeline::{FacePipeline, PipelineConfig, PipelineReport};
use super::session_logger::{NullSessionLogger, SessionLogger};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: BackendKind,
    /// Intra-op threads per engine; ignored by backends without thread
    /// control.
    pub threads: Option<usize>,
    pub tracker: TrackerConfig,
    pub pipeline: PipelineConfig,
}

impl EngineConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| FaceError::Configuration(format!("invalid engine config: {e}")))?;
        config.tracker.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| FaceError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json_str(&text)
    }
}

/// Faces after one frame of a sequence.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameResult {
    pub frame: usize,
    pub faces: Vec<TrackedFace>,
}

pub struct EngineSession {
    tracker: FaceTracker,
    pipeline: FacePipeline,
    logger: Box<dyn SessionLogger>,
    frames: usize,
}

impl EngineSession {
    /// Builds a session on ONNX Runtime engines for `config.backend`.
    pub fn configure(source: &dyn ModelSource, config: EngineConfig) -> Result<Self> {
        let mut factory = OrtEngineFactory::new(config.backend);
        if let Some(threads) = config.threads {
            factory = factory.with_threads(threads);
        }
        Self::configure_with(source, &factory, config)
    }

    pub fn configure_with(
        source: &dyn ModelSource,
        factory: &dyn EngineFactory,
        config: EngineConfig,
    ) -> Result<Self> {
        let tracker = FaceTracker::configure(source, factory, config.tracker)?;
        let pipeline = FacePipeline::new(source, factory, config.pipeline);
        log::info!(
            "Session ready on {} backend, capabilities: {:?}",
            factory.backend(),
            Capability::ALL
                .into_iter()
                .filter(|&c| pipeline.is_enabled(c))
                .collect::<Vec<_>>()
        );
        Ok(Self {
            tracker,
            pipeline,
            logger: Box::new(NullSessionLogger),
            frames: 0,
        })
    }

    pub fn with_logger(mut self, logger: Box<dyn SessionLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn faces(&self) -> &[TrackedFace] {
        self.tracker.tracked_faces()
    }

    pub fn tracker_stats(&self) -> &TrackerStats {
        self.tracker.stats()
    }

    pub fn is_enabled(&self, capability: Capability) -> bool {
        self.pipeline.is_enabled(capability)
    }

    pub fn reset(&mut self) {
        self.tracker.reset();
    }

    pub fn update_stream(
        &mut self,
        image: &dyn ImageSource,
        force_detect: bool,
    ) -> Result<&[TrackedFace]> {
        let start = Instant::now();
        let count = self.tracker.update_stream(image, force_detect)?.len();
        self.logger.timing("track", elapsed_ms(start));
        self.logger.metric("faces", count as f64);
        Ok(self.tracker.tracked_faces())
    }

    /// Runs `capabilities` on the face at `face_index` of the current set.
    pub fn pipeline_process(
        &mut self,
        image: &dyn ImageSource,
        face_index: usize,
        capabilities: &[Capability],
    ) -> Result<PipelineReport> {
        let face = self
            .tracker
            .faces_mut()
            .get_mut(face_index)
            .ok_or_else(|| {
                FaceError::Configuration(format!("no tracked face at index {face_index}"))
            })?;
        let start = Instant::now();
        let report = self.pipeline.process(image, face, capabilities);
        self.logger.timing("pipeline", elapsed_ms(start));
        Ok(report)
    }

    /// Tracks, then runs every enabled capability on every face.
    pub fn process_frame(&mut self, image: &dyn ImageSource) -> Result<&[TrackedFace]> {
        self.process_frame_with(image, false)
    }

    /// [`process_frame`](Self::process_frame) with control over the
    /// detection cadence.
    pub fn process_frame_with(
        &mut self,
        image: &dyn ImageSource,
        force_detect: bool,
    ) -> Result<&[TrackedFace]> {
        self.update_stream(image, force_detect)?;
        let capabilities: Vec<_> = Capability::ALL
            .into_iter()
            .filter(|&c| self.pipeline.is_enabled(c))
            .collect();
        if !capabilities.is_empty() {
            for index in 0..self.tracker.tracked_faces().len() {
                self.pipeline_process(image, index, &capabilities)?;
            }
        }
        self.logger.frame_done(self.frames);
        self.frames += 1;
        Ok(self.tracker.tracked_faces())
    }

    /// Processes one independent input sequence from a clean tracker, so no
    /// face carries over from whatever ran before.
    pub fn process_sequence<I>(&mut self, frames: I, force_detect: bool) -> Result<Vec<FrameResult>>
    where
        I: IntoIterator<Item = Result<Frame>>,
    {
        self.reset();
        let mut results = Vec::new();
        for frame in frames {
            let frame = frame?;
            let faces = self.process_frame_with(&frame, force_detect)?.to_vec();
            results.push(FrameResult {
                frame: frame.index(),
                faces,
            });
        }
        Ok(results)
    }

    /// Emits the logger summary.
    pub fn finish(&self) {
        self.logger.summary();
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
