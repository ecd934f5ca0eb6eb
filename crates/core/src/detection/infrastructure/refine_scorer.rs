use crate::inference::infrastructure::engine_factory::EngineFactory;
use crate::inference::infrastructure::model_runner::ModelRunner;
use crate::inference::infrastructure::presets::{ModelRole, KEY_SCORE_INDEX};
use crate::shared::error::{FaceError, Result};
use crate::shared::frame::Frame;
use crate::shared::model_source::ModelBlob;

/// Face/non-face verifier run on every tracked crop.
pub struct RefineScorer {
    runner: ModelRunner,
    score_index: usize,
}

impl RefineScorer {
    pub fn load(factory: &dyn EngineFactory, blob: &ModelBlob) -> Result<Self> {
        let runner = ModelRunner::load(factory, blob, ModelRole::Refine)?;
        let score_index = runner.config().get_int_or(KEY_SCORE_INDEX, 1)?;
        let score_index = usize::try_from(score_index).map_err(FaceError::configuration)?;
        Ok(Self {
            runner,
            score_index,
        })
    }

    /// Probability that `crop` holds a face.
    pub fn score(&mut self, crop: &Frame) -> Result<f32> {
        let outputs = self.runner.infer_image(crop)?;
        outputs
            .first()
            .ok_or_else(|| FaceError::Execution("refine model produced no outputs".into()))?
            .score(self.score_index)
    }
}
