//! Box detector stage.
//!
//! Decodes single-output detectors emitting `[cx, cy, w, h, conf, ...]` rows
//! in input-tensor pixels, either as `[1, dets, feats]` or the transposed
//! `[1, feats, dets]`.

use crate::detection::domain::nms::Detection;
use crate::inference::infrastructure::engine_factory::EngineFactory;
use crate::inference::infrastructure::model_runner::ModelRunner;
use crate::inference::infrastructure::presets::{ModelRole, KEY_CONFIDENCE};
use crate::shared::constants::DEFAULT_DETECTION_CONFIDENCE;
use crate::shared::error::{FaceError, Result};
use crate::shared::frame::Frame;
use crate::shared::geometry::Rect;
use crate::shared::model_source::ModelBlob;

/// Values per row before any per-detection extras.
const MIN_ROW_LEN: usize = 5;

pub struct FaceDetector {
    runner: ModelRunner,
    confidence: f32,
}

impl FaceDetector {
    pub fn load(factory: &dyn EngineFactory, blob: &ModelBlob) -> Result<Self> {
        let runner = ModelRunner::load(factory, blob, ModelRole::Detect)?;
        let confidence = runner
            .config()
            .get_float_or(KEY_CONFIDENCE, DEFAULT_DETECTION_CONFIDENCE as f64)?
            as f32;
        Ok(Self { runner, confidence })
    }

    /// `(width, height)` the detector consumes.
    pub fn input_size(&self) -> Result<(u32, u32)> {
        self.runner.input_size()
    }

    /// Raw detections in `image` coordinates, before NMS.
    pub fn detect(&mut self, image: &Frame) -> Result<Vec<Detection>> {
        let (in_w, in_h) = self.runner.input_size()?;
        let outputs = self.runner.infer_image(image)?;
        let output = outputs
            .first()
            .ok_or_else(|| FaceError::Execution("detector produced no outputs".into()))?;
        let sx = image.width() as f32 / in_w as f32;
        let sy = image.height() as f32 / in_h as f32;
        Ok(decode_rows(&output.values, &output.dims, self.confidence)?
            .into_iter()
            .map(|d| {
                let r = d.rect;
                Detection::new(Rect::new(r.x * sx, r.y * sy, r.width * sx, r.height * sy), d.score)
            })
            .collect())
    }
}

/// Rows scoring at least `confidence`, as corner boxes in tensor pixels.
///
/// A 3-D output is read as transposed when it has more columns than rows and
/// at least `MIN_ROW_LEN` rows. An output with no more detections than
/// features per detection cannot be told apart from row-major and is read
/// row-major.
pub fn decode_rows(data: &[f32], dims: &[usize], confidence: f32) -> Result<Vec<Detection>> {
    let (rows, feats, transposed) = match *dims {
        [1, a, b] | [a, b] if a < b && a >= MIN_ROW_LEN => (b, a, true),
        [1, a, b] | [a, b] => (a, b, false),
        _ => {
            return Err(FaceError::Execution(format!(
                "unexpected detector output shape {dims:?}"
            )))
        }
    };
    if feats < MIN_ROW_LEN || data.len() < rows * feats {
        return Err(FaceError::Execution(format!(
            "detector output {dims:?} holds {} values, rows need {MIN_ROW_LEN}+ features",
            data.len()
        )));
    }

    let value = |row: usize, feat: usize| {
        if transposed {
            data[feat * rows + row]
        } else {
            data[row * feats + feat]
        }
    };

    let mut detections = Vec::new();
    for i in 0..rows {
        let conf = value(i, 4);
        if conf.is_nan() || conf < confidence {
            continue;
        }
        let (cx, cy, w, h) = (value(i, 0), value(i, 1), value(i, 2), value(i, 3));
        if w <= 0.0 || h <= 0.0 {
            continue;
        }
        detections.push(Detection::new(
            Rect::from_corners(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0),
            conf,
        ));
    }
    Ok(detections)
}
