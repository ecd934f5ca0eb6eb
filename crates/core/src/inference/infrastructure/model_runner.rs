use crate::inference::domain::tensor_engine::TensorEngine;
use crate::inference::domain::tensor_info::{
    InputPayload, InputTensorInfo, Normalize, OutputTensorInfo, TensorType,
};
use crate::shared::config_bag::ConfigBag;
use crate::shared::error::{FaceError, Result};
use crate::shared::frame::{Frame, PixelFormat};
use crate::shared::model_source::ModelBlob;

use super::engine_factory::EngineFactory;
use super::presets::{
    preset, ModelRole, KEY_INPUT_CHANNEL, KEY_INPUT_LAYER, KEY_INPUT_SIZE,
    KEY_INPUT_TENSOR_TYPE, KEY_MEAN, KEY_NORM, KEY_OUTPUT_LAYERS, KEY_OUTPUT_TENSOR_TYPE,
    KEY_SWAP_COLOR,
};

/// One output of a single inference, copied out of the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct InferenceOutput {
    pub dims: Vec<usize>,
    pub values: Vec<f32>,
}

impl InferenceOutput {
    /// The classifier score at `index`; a single-value output is its own score.
    pub fn score(&self, index: usize) -> Result<f32> {
        match self.values.as_slice() {
            [only] => Ok(*only),
            values => values.get(index).copied().ok_or_else(|| {
                FaceError::Execution(format!(
                    "score index {index} out of range for output of {} values",
                    values.len()
                ))
            }),
        }
    }
}

/// A single-image-input model bound to its engine and tensor declarations.
pub struct ModelRunner {
    role: ModelRole,
    config: ConfigBag,
    engine: Box<dyn TensorEngine>,
    input: InputTensorInfo,
    outputs: Vec<OutputTensorInfo>,
    swap_color: bool,
}

impl ModelRunner {
    pub fn load(factory: &dyn EngineFactory, blob: &ModelBlob, role: ModelRole) -> Result<Self> {
        let config = preset(role, factory.backend()).merged_with(&blob.config);
        let mut input = input_spec(&config)?;
        let mut outputs = output_specs(&config)?;
        let swap_color = config.get_bool_or(KEY_SWAP_COLOR, false)?;

        let mut engine = factory.create(blob)?;
        engine.initialize(&blob.data, std::slice::from_mut(&mut input), &mut outputs)?;
        log::info!(
            "Loaded {role} model `{}` with input {:?} on {}",
            blob.name,
            input.dims,
            engine.backend()
        );

        Ok(Self {
            role,
            config,
            engine,
            input,
            outputs,
            swap_color,
        })
    }

    pub fn role(&self) -> ModelRole {
        self.role
    }

    /// Effective configuration (preset merged with the model's own).
    pub fn config(&self) -> &ConfigBag {
        &self.config
    }

    /// `(width, height)` of the image input after reconciliation.
    pub fn input_size(&self) -> Result<(u32, u32)> {
        Ok((self.input.width()? as u32, self.input.height()? as u32))
    }

    pub fn infer_image(&mut self, frame: &Frame) -> Result<Vec<InferenceOutput>> {
        self.input.set_image(frame);
        self.input.image_info.swap_color = match frame.format() {
            PixelFormat::Bgr => self.swap_color,
            PixelFormat::Rgb => !self.swap_color,
            PixelFormat::Gray => false,
        };
        let result = self.run();
        self.input.payload = InputPayload::Empty;
        result
    }

    fn run(&mut self) -> Result<Vec<InferenceOutput>> {
        self.engine.pre_process(std::slice::from_ref(&self.input))?;
        self.engine.process(&mut self.outputs)?;
        Ok(self
            .engine
            .outputs()
            .iter()
            .map(|o| InferenceOutput {
                dims: o.dims.clone(),
                values: o.to_f32(),
            })
            .collect())
    }
}

impl Drop for ModelRunner {
    fn drop(&mut self) {
        if let Err(e) = self.engine.finalize() {
            log::warn!("Failed to release {} model: {e}", self.role);
        }
    }
}

fn channel_triplet(values: Vec<f64>, key: &str) -> Result<[f32; 3]> {
    match values.as_slice() {
        [v] => Ok([*v as f32; 3]),
        [a, b, c] => Ok([*a as f32, *b as f32, *c as f32]),
        _ => Err(FaceError::Configuration(format!(
            "`{key}` needs 1 or 3 values, got {}",
            values.len()
        ))),
    }
}

fn input_spec(config: &ConfigBag) -> Result<InputTensorInfo> {
    let tensor_type = TensorType::parse(config.get_str(KEY_INPUT_TENSOR_TYPE)?)?;
    let mut spec = InputTensorInfo::new(config.get_str(KEY_INPUT_LAYER)?, tensor_type);
    if config.contains(KEY_INPUT_SIZE) {
        let size = config.get_int_list(KEY_INPUT_SIZE)?;
        let &[width, height] = size.as_slice() else {
            return Err(FaceError::Configuration(format!(
                "`{KEY_INPUT_SIZE}` must be [width, height], got {size:?}"
            )));
        };
        let channels = config.get_int_or(KEY_INPUT_CHANNEL, 3)?;
        spec.dims = vec![1, channels, height, width];
    }
    spec.normalize = Normalize {
        mean: channel_triplet(config.get_float_list(KEY_MEAN)?, KEY_MEAN)?,
        norm: channel_triplet(config.get_float_list(KEY_NORM)?, KEY_NORM)?,
    };
    Ok(spec)
}

fn output_specs(config: &ConfigBag) -> Result<Vec<OutputTensorInfo>> {
    let tensor_type = TensorType::parse(config.get_str(KEY_OUTPUT_TENSOR_TYPE)?)?;
    let names = config.get_str_list(KEY_OUTPUT_LAYERS)?;
    if names.is_empty() {
        return Err(FaceError::Configuration(format!("`{KEY_OUTPUT_LAYERS}` is empty")));
    }
    Ok(names
        .into_iter()
        .map(|name| OutputTensorInfo::new(name, tensor_type))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::domain::tensor_engine::BackendKind;
    use crate::shared::model_source::ModelData;
    use crate::test_support::{FakeEngineFactory, FakeOutput};
    use std::sync::Arc;

    fn blob(name: &str, config: ConfigBag) -> ModelBlob {
        ModelBlob {
            name: name.into(),
            index: 0,
            backend: None,
            data: ModelData::Buffer(Arc::from(&b"fake"[..])),
            config,
        }
    }

    #[test]
    fn test_input_spec_from_preset() {
        let spec = input_spec(&preset(ModelRole::Mask, BackendKind::Portable)).unwrap();
        assert_eq!(spec.name, "input_1");
        assert_eq!(spec.dims, vec![1, 3, 96, 96]);
        assert_eq!(spec.tensor_type, TensorType::Fp32);
    }

    #[test]
    fn test_bad_input_size_rejected() {
        let config = ConfigBag::new()
            .with(KEY_INPUT_TENSOR_TYPE, "fp32")
            .with(KEY_INPUT_LAYER, "x")
            .with(KEY_INPUT_SIZE, vec![1i64, 2, 3])
            .with(KEY_MEAN, vec![0.0f64])
            .with(KEY_NORM, vec![1.0f64]);
        assert!(input_spec(&config).unwrap_err().is_configuration());
    }

    #[test]
    fn test_score_selection() {
        let out = |values: Vec<f32>| InferenceOutput {
            dims: vec![values.len()],
            values,
        };
        assert_eq!(out(vec![0.2, 0.8]).score(1).unwrap(), 0.8);
        assert_eq!(out(vec![0.4]).score(1).unwrap(), 0.4);
        assert!(out(vec![0.1, 0.2]).score(5).is_err());
        assert!(out(vec![]).score(0).is_err());
    }

    #[test]
    fn test_single_mean_broadcasts() {
        assert_eq!(channel_triplet(vec![127.5], KEY_MEAN).unwrap(), [127.5; 3]);
        assert!(channel_triplet(vec![1.0, 2.0], KEY_MEAN).is_err());
    }

    #[test]
    fn test_model_config_overrides_preset() {
        let factory = FakeEngineFactory::new().with_model("mask_detect", |_| {
            vec![FakeOutput::new(vec![1, 2], vec![0.97, 0.03])]
        });
        let runner = ModelRunner::load(
            &factory,
            &blob("mask_detect", ConfigBag::new().with(KEY_INPUT_SIZE, vec![64i64, 48])),
            ModelRole::Mask,
        )
        .unwrap();
        assert_eq!(runner.input_size().unwrap(), (64, 48));
        assert_eq!(runner.config().get_str(KEY_INPUT_LAYER).unwrap(), "input_1");
    }

    #[test]
    fn test_infer_image_returns_float_outputs() {
        let factory = FakeEngineFactory::new().with_model("mask_detect", |input| {
            vec![FakeOutput::new(vec![1, 2], vec![input.len() as f32, 0.5])]
        });
        let mut runner =
            ModelRunner::load(&factory, &blob("mask_detect", ConfigBag::new()), ModelRole::Mask)
                .unwrap();
        let frame = Frame::blank(10, 10, PixelFormat::Rgb);
        let out = runner.infer_image(&frame).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].dims, vec![1, 2]);
        assert_eq!(out[0].values[0], (96 * 96 * 3) as f32);
    }

    #[test]
    fn test_rgb_frames_invert_swap_flag() {
        let factory = FakeEngineFactory::new().with_model("mask_detect", |input| {
            vec![FakeOutput::new(vec![1], vec![input[0]])]
        });
        let mut runner =
            ModelRunner::load(&factory, &blob("mask_detect", ConfigBag::new()), ModelRole::Mask)
                .unwrap();
        // A single red pixel resized up stays red; first NCHW value is channel 0.
        let rgb = Frame::new(vec![255, 0, 0], 1, 1, PixelFormat::Rgb, 0).unwrap();
        let bgr = Frame::new(vec![0, 0, 255], 1, 1, PixelFormat::Bgr, 0).unwrap();
        let a = runner.infer_image(&rgb).unwrap()[0].values[0];
        let b = runner.infer_image(&bgr).unwrap()[0].values[0];
        assert_eq!(a, b);
        assert!(a > 0.9);
    }
}
