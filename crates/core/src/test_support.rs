//! Scripted engines so stages can be tested without model files.

use std::collections::HashMap;
use std::sync::Arc;

use crate::inference::domain::tensor_engine::{BackendKind, TensorEngine};
use crate::inference::domain::tensor_info::{
    InputTensorInfo, OutputData, OutputTensor, OutputTensorInfo,
};
use crate::inference::infrastructure::engine_factory::EngineFactory;
use crate::inference::infrastructure::preprocess::{prepare_input, PreparedTensor};
use crate::shared::config_bag::ConfigBag;
use crate::shared::error::{FaceError, Result};
use crate::shared::model_source::{MemoryModelSource, ModelBlob, ModelData};

#[derive(Clone, Debug)]
pub struct FakeOutput {
    pub dims: Vec<usize>,
    pub data: Vec<f32>,
}

impl FakeOutput {
    pub fn new(dims: Vec<usize>, data: Vec<f32>) -> Self {
        Self { dims, data }
    }
}

pub type Script = Arc<dyn Fn(&[f32]) -> Vec<FakeOutput> + Send + Sync>;

#[derive(Clone)]
enum Behavior {
    Script(Script),
    FailInit,
    FailProcess,
}

/// Engine whose outputs are computed by a closure over the flattened,
/// pre-processed input.
pub struct FakeEngine {
    behavior: Behavior,
    input: Vec<f32>,
    outputs: Vec<OutputTensor>,
}

impl TensorEngine for FakeEngine {
    fn backend(&self) -> BackendKind {
        BackendKind::Portable
    }

    fn initialize(
        &mut self,
        _model: &ModelData,
        inputs: &mut [InputTensorInfo],
        _outputs: &mut [OutputTensorInfo],
    ) -> Result<()> {
        if matches!(self.behavior, Behavior::FailInit) {
            return Err(FaceError::Configuration("scripted init failure".into()));
        }
        for spec in inputs.iter_mut() {
            if spec.dims.is_empty() {
                spec.dims = vec![1, 3, 32, 32];
            }
        }
        Ok(())
    }

    fn pre_process(&mut self, inputs: &[InputTensorInfo]) -> Result<()> {
        let spec = inputs
            .first()
            .ok_or_else(|| FaceError::Configuration("no inputs".into()))?;
        self.input = match prepare_input(spec, BackendKind::Portable)? {
            PreparedTensor::F32(a) => a.iter().copied().collect(),
            PreparedTensor::U8(a) => a.iter().map(|&v| v as f32).collect(),
        };
        Ok(())
    }

    fn process(&mut self, outputs: &mut [OutputTensorInfo]) -> Result<()> {
        let script = match &self.behavior {
            Behavior::Script(s) => Arc::clone(s),
            Behavior::FailInit => unreachable!("initialize failed"),
            Behavior::FailProcess => {
                return Err(FaceError::Execution("scripted failure".into()));
            }
        };
        let produced = script(&self.input);
        self.outputs = outputs
            .iter_mut()
            .zip(produced)
            .map(|(spec, out)| {
                spec.dims = out.dims.iter().map(|&d| d as i64).collect();
                OutputTensor {
                    name: spec.name.clone(),
                    dims: out.dims,
                    data: OutputData::F32(out.data),
                    quant_scale: 1.0,
                    quant_zero_point: 0,
                }
            })
            .collect();
        Ok(())
    }

    fn outputs(&self) -> &[OutputTensor] {
        &self.outputs
    }

    fn finalize(&mut self) -> Result<()> {
        self.outputs.clear();
        Ok(())
    }
}

/// Maps model names to scripted engines.
#[derive(Clone, Default)]
pub struct FakeEngineFactory {
    models: HashMap<String, Behavior>,
}

impl FakeEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(
        mut self,
        name: &str,
        script: impl Fn(&[f32]) -> Vec<FakeOutput> + Send + Sync + 'static,
    ) -> Self {
        self.models
            .insert(name.to_string(), Behavior::Script(Arc::new(script)));
        self
    }

    pub fn with_failing_init(mut self, name: &str) -> Self {
        self.models.insert(name.to_string(), Behavior::FailInit);
        self
    }

    pub fn with_failing_process(mut self, name: &str) -> Self {
        self.models.insert(name.to_string(), Behavior::FailProcess);
        self
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// A memory model source holding an entry for every scripted model.
    pub fn model_source(&self) -> MemoryModelSource {
        let mut source = MemoryModelSource::new();
        for (i, name) in self.models.keys().enumerate() {
            source.insert(ModelBlob {
                name: name.clone(),
                index: 100 + i,
                backend: None,
                data: ModelData::Buffer(Arc::from(&b"fake"[..])),
                config: ConfigBag::new(),
            });
        }
        source
    }
}

impl EngineFactory for FakeEngineFactory {
    fn backend(&self) -> BackendKind {
        BackendKind::Portable
    }

    fn create(&self, blob: &ModelBlob) -> Result<Box<dyn TensorEngine>> {
        let behavior = self
            .models
            .get(&blob.name)
            .cloned()
            .ok_or_else(|| FaceError::ModelNotFound(blob.name.clone()))?;
        Ok(Box::new(FakeEngine {
            behavior,
            input: Vec::new(),
            outputs: Vec::new(),
        }))
    }
}
