//! `TensorEngine` over ONNX Runtime via `ort`.
//!
//! One implementation serves every backend kind; the kind selects the
//! execution provider, the native input layout and which operations are
//! allowed (buffer loading, shape overrides, thread control).

use ort::session::Session;
use ort::tensor::TensorElementType;
use ort::value::{DynValue, Tensor, ValueType};

use crate::inference::domain::tensor_engine::{BackendKind, TensorEngine};
use crate::inference::domain::tensor_info::{
    InputTensorInfo, OutputData, OutputTensor, OutputTensorInfo, TensorType,
};
use crate::shared::error::{FaceError, Result};
use crate::shared::model_source::ModelData;

use super::execution_provider::execution_providers;
use super::preprocess::{prepare_input, PreparedTensor};

pub struct OrtEngine {
    backend: BackendKind,
    threads: Option<usize>,
    model: Option<ModelData>,
    overrides: Vec<(String, i64)>,
    session: Option<Session>,
    prepared: Vec<(String, PreparedTensor)>,
    outputs: Vec<OutputTensor>,
}

impl OrtEngine {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            threads: None,
            model: None,
            overrides: Vec::new(),
            session: None,
            prepared: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn unsupported(&self, operation: &'static str) -> FaceError {
        FaceError::Unsupported {
            backend: self.backend,
            operation,
        }
    }

    fn build_session(&self, model: &ModelData, overrides: &[(String, i64)]) -> Result<Session> {
        let mut builder = Session::builder()
            .map_err(FaceError::configuration)?
            .with_execution_providers(execution_providers(self.backend))
            .map_err(FaceError::configuration)?;
        if let Some(threads) = self.threads {
            builder = builder
                .with_intra_threads(threads)
                .map_err(FaceError::configuration)?;
        }
        for (symbol, size) in overrides {
            builder = builder
                .with_dimension_override(symbol.as_str(), *size)
                .map_err(FaceError::configuration)?;
        }
        let session = match model {
            ModelData::File(path) => builder.commit_from_file(path),
            ModelData::Buffer(bytes) => builder.commit_from_memory(bytes),
        };
        session.map_err(FaceError::configuration)
    }

    /// Reconciles declared inputs with the session's, returning the
    /// symbolic-dimension overrides the declared shapes require.
    fn reconcile_inputs(
        &self,
        session: &Session,
        inputs: &mut [InputTensorInfo],
    ) -> Result<Vec<(String, i64)>> {
        let dynamic = self.backend.capabilities().dynamic_shapes;
        let nhwc = self.backend.is_nhwc();
        let mut overrides = Vec::new();

        for spec in inputs.iter_mut() {
            let outlet = session
                .inputs()
                .iter()
                .find(|i| i.name() == spec.name)
                .ok_or_else(|| {
                    FaceError::Configuration(format!("model has no input named `{}`", spec.name))
                })?;
            let ModelTensor { ty, shape, symbols } = describe(outlet.dtype(), &spec.name)?;
            if ty != spec.tensor_type {
                return Err(FaceError::Configuration(format!(
                    "input `{}` is {:?} in the model but declared {:?}",
                    spec.name, ty, spec.tensor_type
                )));
            }

            let logical = to_logical(&shape, nhwc);
            let logical_symbols = to_logical(&symbols, nhwc);
            let (dims, resized) = reconcile_dims(&spec.name, &spec.dims, &logical, dynamic)?;
            for idx in resized {
                let symbol = &logical_symbols[idx];
                if symbol.is_empty() {
                    return Err(FaceError::Configuration(format!(
                        "input `{}` dimension {idx} is dynamic but unnamed",
                        spec.name
                    )));
                }
                log::warn!(
                    "Resizing input `{}` dimension `{symbol}` to {}",
                    spec.name,
                    dims[idx]
                );
                overrides.push((symbol.clone(), dims[idx]));
            }
            spec.dims = dims;
        }
        Ok(overrides)
    }

    fn reconcile_outputs(session: &Session, outputs: &mut [OutputTensorInfo]) -> Result<()> {
        for spec in outputs.iter_mut() {
            let outlet = session
                .outputs()
                .iter()
                .find(|o| o.name() == spec.name)
                .ok_or_else(|| {
                    FaceError::Configuration(format!("model has no output named `{}`", spec.name))
                })?;
            let described = describe(outlet.dtype(), &spec.name)?;
            if described.ty != spec.tensor_type {
                return Err(FaceError::Configuration(format!(
                    "output `{}` is {:?} in the model but declared {:?}",
                    spec.name, described.ty, spec.tensor_type
                )));
            }
            spec.dims = described.shape;
        }
        Ok(())
    }

    fn require_model(&self) -> Result<ModelData> {
        self.model
            .clone()
            .ok_or_else(|| FaceError::Configuration("engine is not initialized".into()))
    }
}

impl TensorEngine for OrtEngine {
    fn backend(&self) -> BackendKind {
        self.backend
    }

    fn initialize(
        &mut self,
        model: &ModelData,
        inputs: &mut [InputTensorInfo],
        outputs: &mut [OutputTensorInfo],
    ) -> Result<()> {
        if matches!(model, ModelData::Buffer(_)) && !self.capabilities().buffer_loading {
            return Err(self.unsupported("loading models from memory"));
        }

        let mut session = self.build_session(model, &[])?;
        let overrides = self.reconcile_inputs(&session, inputs)?;
        Self::reconcile_outputs(&session, outputs)?;
        if !overrides.is_empty() {
            session = self.build_session(model, &overrides)?;
        }

        log::info!(
            "Initialized {} engine with {} inputs, {} outputs",
            self.backend,
            inputs.len(),
            outputs.len()
        );
        self.model = Some(model.clone());
        self.overrides = overrides;
        self.session = Some(session);
        self.prepared.clear();
        self.outputs.clear();
        Ok(())
    }

    fn pre_process(&mut self, inputs: &[InputTensorInfo]) -> Result<()> {
        if self.session.is_none() {
            return Err(FaceError::Configuration("engine is not initialized".into()));
        }
        let prepared = inputs
            .iter()
            .map(|spec| Ok((spec.name.clone(), prepare_input(spec, self.backend)?)))
            .collect::<Result<Vec<_>>>()?;
        self.prepared = prepared;
        Ok(())
    }

    fn process(&mut self, outputs: &mut [OutputTensorInfo]) -> Result<()> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| FaceError::Configuration("engine is not initialized".into()))?;

        let mut feed: Vec<(String, DynValue)> = Vec::with_capacity(self.prepared.len());
        for (name, tensor) in &self.prepared {
            let value = match tensor {
                PreparedTensor::F32(a) => Tensor::from_array(a.clone())
                    .map_err(FaceError::execution)?
                    .into_dyn(),
                PreparedTensor::U8(a) => Tensor::from_array(a.clone())
                    .map_err(FaceError::execution)?
                    .into_dyn(),
            };
            feed.push((name.clone(), value));
        }

        let results = session.run(feed).map_err(FaceError::execution)?;
        let mut retained = Vec::with_capacity(outputs.len());
        for spec in outputs.iter_mut() {
            let value = results.get(spec.name.as_str()).ok_or_else(|| {
                FaceError::Execution(format!("runtime produced no output `{}`", spec.name))
            })?;
            let (tensor_type, dims, data) = match value.dtype() {
                ValueType::Tensor {
                    ty: TensorElementType::Float32,
                    ..
                } => {
                    let view = value
                        .try_extract_array::<f32>()
                        .map_err(FaceError::execution)?;
                    let dims = view.shape().to_vec();
                    (TensorType::Fp32, dims, OutputData::F32(view.iter().copied().collect()))
                }
                ValueType::Tensor {
                    ty: TensorElementType::Uint8,
                    ..
                } => {
                    let view = value
                        .try_extract_array::<u8>()
                        .map_err(FaceError::execution)?;
                    let dims = view.shape().to_vec();
                    (TensorType::Uint8, dims, OutputData::U8(view.iter().copied().collect()))
                }
                other => {
                    return Err(FaceError::Execution(format!(
                        "output `{}` has unexpected type {other:?}",
                        spec.name
                    )))
                }
            };
            spec.tensor_type = tensor_type;
            spec.dims = dims.iter().map(|&d| d as i64).collect();
            retained.push(OutputTensor {
                name: spec.name.clone(),
                dims,
                data,
                quant_scale: spec.quant_scale,
                quant_zero_point: spec.quant_zero_point,
            });
        }
        drop(results);
        self.outputs = retained;
        Ok(())
    }

    fn outputs(&self) -> &[OutputTensor] {
        &self.outputs
    }

    fn finalize(&mut self) -> Result<()> {
        self.session = None;
        self.model = None;
        self.overrides.clear();
        self.prepared.clear();
        self.outputs.clear();
        Ok(())
    }

    fn set_num_threads(&mut self, threads: usize) -> Result<()> {
        if !self.capabilities().thread_control {
            return Err(self.unsupported("thread control"));
        }
        if threads == 0 {
            return Err(FaceError::Configuration("thread count must be at least 1".into()));
        }
        self.threads = Some(threads);
        if let Some(model) = self.model.clone() {
            self.session = Some(self.build_session(&model, &self.overrides)?);
        }
        Ok(())
    }

    fn resize_input(&mut self, inputs: &mut [InputTensorInfo]) -> Result<()> {
        if !self.capabilities().dynamic_shapes {
            return Err(self.unsupported("input resizing"));
        }
        let model = self.require_model()?;
        let base = self.build_session(&model, &[])?;
        let overrides = self.reconcile_inputs(&base, inputs)?;
        self.session = Some(self.build_session(&model, &overrides)?);
        self.overrides = overrides;
        self.prepared.clear();
        Ok(())
    }

    fn input_names(&self) -> Result<Vec<String>> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| FaceError::Configuration("engine is not initialized".into()))?;
        Ok(session.inputs().iter().map(|i| i.name().to_string()).collect())
    }
}

impl Drop for OrtEngine {
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}

// ---------------------------------------------------------------------------
// Shape reconciliation
// ---------------------------------------------------------------------------

struct ModelTensor {
    ty: TensorType,
    shape: Vec<i64>,
    /// Symbolic name per dimension, empty when the dimension is fixed.
    symbols: Vec<String>,
}

fn describe(dtype: &ValueType, name: &str) -> Result<ModelTensor> {
    let ValueType::Tensor {
        ty,
        shape,
        dimension_symbols,
        ..
    } = dtype
    else {
        return Err(FaceError::Configuration(format!(
            "`{name}` is not a tensor"
        )));
    };
    let ty = match ty {
        TensorElementType::Float32 => TensorType::Fp32,
        TensorElementType::Uint8 => TensorType::Uint8,
        other => {
            return Err(FaceError::Configuration(format!(
                "`{name}` has unsupported element type {other:?}"
            )))
        }
    };
    let shape: Vec<i64> = shape.iter().copied().collect();
    let mut symbols: Vec<String> = dimension_symbols.iter().map(|s| s.to_string()).collect();
    symbols.resize(shape.len(), String::new());
    Ok(ModelTensor { ty, shape, symbols })
}

/// NHWC model shapes are viewed as logical NCHW.
fn to_logical<T: Clone>(shape: &[T], nhwc: bool) -> Vec<T> {
    if nhwc && shape.len() == 4 {
        vec![
            shape[0].clone(),
            shape[3].clone(),
            shape[1].clone(),
            shape[2].clone(),
        ]
    } else {
        shape.to_vec()
    }
}

/// Reconciles declared dims against the model's, returning the final dims
/// and the indices that need a symbolic-dimension override.
///
/// - declared empty: take the model's dims; a dynamic batch becomes 1.
/// - declared equal to a fixed model dim: accepted.
/// - declared against a dynamic model dim: resized when the backend
///   supports dynamic shapes, rejected otherwise.
/// - declared against a different fixed model dim: the model's dim is
///   adopted when the backend supports dynamic shapes (image inputs are
///   resampled to it), rejected otherwise.
/// - any non-positive result: rejected.
pub(crate) fn reconcile_dims(
    name: &str,
    declared: &[i64],
    model: &[i64],
    dynamic: bool,
) -> Result<(Vec<i64>, Vec<usize>)> {
    let reject = |msg: String| Err(FaceError::Configuration(format!("input `{name}`: {msg}")));

    if declared.is_empty() {
        let mut dims = model.to_vec();
        let mut resized = Vec::new();
        for (i, d) in dims.iter_mut().enumerate() {
            if *d > 0 {
                continue;
            }
            if i == 0 && dynamic {
                *d = 1;
                resized.push(0);
            } else {
                return reject(format!("model dimension {i} is not fixed ({model:?})"));
            }
        }
        return Ok((dims, resized));
    }

    if declared.len() != model.len() {
        return reject(format!(
            "declared rank {} does not match model rank {}",
            declared.len(),
            model.len()
        ));
    }

    let mut dims = declared.to_vec();
    let mut resized = Vec::new();
    for (i, (&d, &m)) in declared.iter().zip(model).enumerate() {
        if d <= 0 {
            return reject(format!("declared dimension {i} is {d}"));
        }
        if m > 0 {
            if d != m {
                if !dynamic {
                    return reject(format!("declared {declared:?} but model expects {model:?}"));
                }
                log::warn!("Input `{name}` dimension {i} is fixed at {m} by the model, not {d}");
                dims[i] = m;
            }
        } else if dynamic {
            resized.push(i);
        } else {
            return reject(format!("backend cannot bind dynamic dimension {i} to {d}"));
        }
    }
    Ok((dims, resized))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_accepted() {
        let (dims, resized) =
            reconcile_dims("data", &[1, 3, 112, 112], &[1, 3, 112, 112], false).unwrap();
        assert_eq!(dims, vec![1, 3, 112, 112]);
        assert!(resized.is_empty());
    }

    #[test]
    fn test_unset_takes_model_dims() {
        let (dims, resized) = reconcile_dims("data", &[], &[1, 3, 96, 96], false).unwrap();
        assert_eq!(dims, vec![1, 3, 96, 96]);
        assert!(resized.is_empty());
    }

    #[test]
    fn test_unset_dynamic_batch_becomes_one() {
        let (dims, resized) = reconcile_dims("data", &[], &[-1, 3, 96, 96], true).unwrap();
        assert_eq!(dims, vec![1, 3, 96, 96]);
        assert_eq!(resized, vec![0]);
    }

    #[test]
    fn test_unset_dynamic_spatial_rejected() {
        let err = reconcile_dims("data", &[], &[1, 3, -1, -1], true).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_dynamic_dims_resized_on_dynamic_backend() {
        let (dims, resized) =
            reconcile_dims("data", &[1, 3, 160, 160], &[1, 3, -1, -1], true).unwrap();
        assert_eq!(dims, vec![1, 3, 160, 160]);
        assert_eq!(resized, vec![2, 3]);
    }

    #[test]
    fn test_dynamic_dims_rejected_on_fixed_backend() {
        assert!(reconcile_dims("data", &[1, 3, 160, 160], &[1, 3, -1, -1], false).is_err());
    }

    #[test]
    fn test_fixed_mismatch_rejected_on_fixed_backend() {
        let err = reconcile_dims("data", &[1, 3, 128, 128], &[1, 3, 112, 112], false).unwrap_err();
        assert!(err.to_string().contains("model expects"));
    }

    #[test]
    fn test_fixed_mismatch_adopts_model_dims_on_dynamic_backend() {
        let (dims, resized) =
            reconcile_dims("data", &[1, 3, 128, 128], &[1, 3, 112, 112], true).unwrap();
        assert_eq!(dims, vec![1, 3, 112, 112]);
        assert!(resized.is_empty());
    }

    #[test]
    fn test_mixed_fixed_and_dynamic_dims() {
        let (dims, resized) =
            reconcile_dims("data", &[4, 3, 128, 128], &[-1, 3, 112, 112], true).unwrap();
        assert_eq!(dims, vec![4, 3, 112, 112]);
        assert_eq!(resized, vec![0]);
    }

    #[test]
    fn test_non_positive_declared_rejected() {
        assert!(reconcile_dims("data", &[1, 0, 112, 112], &[1, 3, 112, 112], true).is_err());
    }

    #[test]
    fn test_rank_mismatch_rejected() {
        assert!(reconcile_dims("data", &[3, 112, 112], &[1, 3, 112, 112], true).is_err());
    }

    #[test]
    fn test_nhwc_shape_viewed_as_nchw() {
        assert_eq!(to_logical(&[1, 80, 80, 3], true), vec![1, 3, 80, 80]);
        assert_eq!(to_logical(&[1, 80, 80, 3], false), vec![1, 80, 80, 3]);
    }

    #[test]
    fn test_platform_rejects_buffer_models() {
        let mut engine = OrtEngine::new(BackendKind::Platform);
        let model = ModelData::Buffer(std::sync::Arc::from(&b"onnx"[..]));
        let err = engine.initialize(&model, &mut [], &mut []).unwrap_err();
        assert!(matches!(
            err,
            FaceError::Unsupported {
                backend: BackendKind::Platform,
                ..
            }
        ));
    }

    #[test]
    fn test_thread_control_only_on_portable() {
        assert!(OrtEngine::new(BackendKind::Portable).set_num_threads(2).is_ok());
        assert!(matches!(
            OrtEngine::new(BackendKind::Npu).set_num_threads(2),
            Err(FaceError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_resize_unsupported_on_fixed_backends() {
        let mut engine = OrtEngine::new(BackendKind::Npu);
        assert!(matches!(
            engine.resize_input(&mut []),
            Err(FaceError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_calls_before_initialize_fail_cleanly() {
        let mut engine = OrtEngine::new(BackendKind::Portable);
        assert!(engine.pre_process(&[]).unwrap_err().is_configuration());
        assert!(engine.process(&mut []).unwrap_err().is_configuration());
        assert!(engine.input_names().is_err());
        assert!(engine.outputs().is_empty());
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut engine = OrtEngine::new(BackendKind::Portable);
        assert!(engine.finalize().is_ok());
        assert!(engine.finalize().is_ok());
    }
}
