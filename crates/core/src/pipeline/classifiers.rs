use crate::inference::infrastructure::engine_factory::EngineFactory;
use crate::inference::infrastructure::model_runner::ModelRunner;
use crate::inference::infrastructure::presets::{ModelRole, KEY_SCORE_INDEX};
use crate::shared::error::{FaceError, Result};
use crate::shared::frame::Frame;
use crate::shared::model_source::ModelBlob;

/// Single-score image classifier shared by every analysis stage.
pub struct Classifier {
    runner: ModelRunner,
    score_index: usize,
}

impl Classifier {
    pub fn load(factory: &dyn EngineFactory, blob: &ModelBlob, role: ModelRole) -> Result<Self> {
        let runner = ModelRunner::load(factory, blob, role)?;
        let score_index = runner.config().get_int_or(KEY_SCORE_INDEX, 0)?;
        let score_index = usize::try_from(score_index).map_err(FaceError::configuration)?;
        Ok(Self {
            runner,
            score_index,
        })
    }

    pub fn role(&self) -> ModelRole {
        self.runner.role()
    }

    pub fn input_size(&self) -> Result<(u32, u32)> {
        self.runner.input_size()
    }

    pub fn score(&mut self, crop: &Frame) -> Result<f32> {
        let outputs = self.runner.infer_image(crop)?;
        outputs
            .first()
            .ok_or_else(|| FaceError::Execution(format!("{} model produced no outputs", self.role())))?
            .score(self.score_index)
    }
}
