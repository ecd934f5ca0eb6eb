use crate::detection::domain::face_landmarks::LandmarkLayout;
use crate::inference::infrastructure::engine_factory::EngineFactory;
use crate::inference::infrastructure::model_runner::ModelRunner;
use crate::inference::infrastructure::presets::{ModelRole, KEY_KEY_POINTS, KEY_LANDMARK_COUNT};
use crate::shared::error::{FaceError, Result};
use crate::shared::frame::Frame;
use crate::shared::geometry::Point;
use crate::shared::model_source::ModelBlob;

/// Regresses landmarks on a face crop.
///
/// The first output holds `2 * count` coordinates normalized to the crop;
/// an optional second output holds the prediction confidence.
pub struct LandmarkPredictor {
    runner: ModelRunner,
    layout: LandmarkLayout,
}

impl LandmarkPredictor {
    pub fn load(factory: &dyn EngineFactory, blob: &ModelBlob) -> Result<Self> {
        let runner = ModelRunner::load(factory, blob, ModelRole::Landmark)?;
        let config = runner.config();
        let count = config.get_int_or(KEY_LANDMARK_COUNT, 5)?;
        let key_points = config.get_int_list(KEY_KEY_POINTS)?;
        let key_points: [usize; 5] = key_points
            .iter()
            .map(|&k| usize::try_from(k))
            .collect::<std::result::Result<Vec<_>, _>>()
            .ok()
            .and_then(|v| v.try_into().ok())
            .ok_or_else(|| {
                FaceError::Configuration(format!(
                    "`{KEY_KEY_POINTS}` needs five non-negative indices, got {key_points:?}"
                ))
            })?;
        let count = usize::try_from(count).map_err(FaceError::configuration)?;
        let layout = LandmarkLayout::new(count, key_points)?;
        Ok(Self { runner, layout })
    }

    pub fn layout(&self) -> LandmarkLayout {
        self.layout
    }

    pub fn input_size(&self) -> Result<(u32, u32)> {
        self.runner.input_size()
    }

    /// Landmarks in `crop` pixels plus the model's confidence (1.0 when the
    /// model has no confidence output).
    pub fn predict(&mut self, crop: &Frame) -> Result<(Vec<Point>, f32)> {
        let outputs = self.runner.infer_image(crop)?;
        let coords = outputs
            .first()
            .ok_or_else(|| FaceError::Execution("landmark model produced no outputs".into()))?;
        let needed = self.layout.count * 2;
        if coords.values.len() < needed {
            return Err(FaceError::Execution(format!(
                "landmark output has {} values, expected {needed}",
                coords.values.len()
            )));
        }

        let (w, h) = (crop.width() as f32, crop.height() as f32);
        let points = coords.values[..needed]
            .chunks_exact(2)
            .map(|xy| Point::new(xy[0] * w, xy[1] * h))
            .collect();
        let confidence = match outputs.get(1) {
            Some(out) => out.score(0)?,
            None => 1.0,
        };
        Ok((points, confidence))
    }
}
