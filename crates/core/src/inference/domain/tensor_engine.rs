use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::inference::domain::tensor_info::{InputTensorInfo, OutputTensor, OutputTensorInfo};
use crate::shared::error::{FaceError, Result};
use crate::shared::model_source::ModelData;

/// Which inference runtime family executes a model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Portable tensor-graph runtime on the CPU.
    #[default]
    Portable,
    /// Vendor NPU runtime: fixed shapes, uint8 NHWC input.
    Npu,
    /// Platform ML runtime: fixed shapes, file-based loading only.
    Platform,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::Portable, BackendKind::Npu, BackendKind::Platform];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Portable => "portable",
            BackendKind::Npu => "npu",
            BackendKind::Platform => "platform",
        }
    }

    pub fn capabilities(self) -> EngineCapabilities {
        match self {
            BackendKind::Portable => EngineCapabilities {
                buffer_loading: true,
                dynamic_shapes: true,
                crop: false,
                thread_control: true,
            },
            BackendKind::Npu => EngineCapabilities {
                buffer_loading: true,
                dynamic_shapes: false,
                crop: false,
                thread_control: false,
            },
            BackendKind::Platform => EngineCapabilities {
                buffer_loading: false,
                dynamic_shapes: false,
                crop: false,
                thread_control: false,
            },
        }
    }

    /// Whether image inputs are fed as NHWC (otherwise NCHW).
    pub fn is_nhwc(self) -> bool {
        self == BackendKind::Npu
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        BackendKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown backend `{s}` (expected portable, npu or platform)"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineCapabilities {
    pub buffer_loading: bool,
    /// Symbolic input dims can be bound, and a declared size that differs
    /// from a fixed model dim gives way to the model instead of failing.
    pub dynamic_shapes: bool,
    pub crop: bool,
    pub thread_control: bool,
}

/// Uniform contract over inference backends.
///
/// Call order is `initialize`, then any number of `pre_process` + `process`
/// pairs, then `finalize`. The slice returned by `outputs` is only valid
/// until the next `process` or `finalize`; the borrow checker enforces it.
pub trait TensorEngine: Send {
    fn backend(&self) -> BackendKind;

    fn capabilities(&self) -> EngineCapabilities {
        self.backend().capabilities()
    }

    /// Loads the model and reconciles the declared tensors with it, writing
    /// inferred shapes back into `inputs` and `outputs`.
    fn initialize(
        &mut self,
        model: &ModelData,
        inputs: &mut [InputTensorInfo],
        outputs: &mut [OutputTensorInfo],
    ) -> Result<()>;

    /// Converts the payload of every input into a backend-native tensor.
    fn pre_process(&mut self, inputs: &[InputTensorInfo]) -> Result<()>;

    /// Runs the model on the last pre-processed inputs.
    fn process(&mut self, outputs: &mut [OutputTensorInfo]) -> Result<()>;

    fn outputs(&self) -> &[OutputTensor];

    /// Releases the runtime. Safe to call more than once.
    fn finalize(&mut self) -> Result<()>;

    fn set_num_threads(&mut self, _threads: usize) -> Result<()> {
        Err(FaceError::Unsupported {
            backend: self.backend(),
            operation: "thread control",
        })
    }

    fn resize_input(&mut self, _inputs: &mut [InputTensorInfo]) -> Result<()> {
        Err(FaceError::Unsupported {
            backend: self.backend(),
            operation: "input resizing",
        })
    }

    fn input_names(&self) -> Result<Vec<String>> {
        Err(FaceError::Unsupported {
            backend: self.backend(),
            operation: "input name listing",
        })
    }
}
