use crate::inference::domain::tensor_engine::{BackendKind, TensorEngine};
use crate::shared::error::{FaceError, Result};
use crate::shared::model_source::ModelBlob;

use super::ort_engine::OrtEngine;

/// Builds one engine per model. Shared across stages and threads.
pub trait EngineFactory: Send + Sync {
    fn backend(&self) -> BackendKind;

    fn create(&self, blob: &ModelBlob) -> Result<Box<dyn TensorEngine>>;
}

/// Creates an uninitialized engine for the given backend.
pub fn create_engine(kind: BackendKind) -> Box<dyn TensorEngine> {
    Box::new(OrtEngine::new(kind))
}

/// Factory producing ONNX Runtime engines for one backend kind.
#[derive(Clone, Debug)]
pub struct OrtEngineFactory {
    backend: BackendKind,
    threads: Option<usize>,
}

impl OrtEngineFactory {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            threads: None,
        }
    }

    /// Intra-op threads per engine; ignored with a warning by backends
    /// without thread control.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }
}

impl EngineFactory for OrtEngineFactory {
    fn backend(&self) -> BackendKind {
        self.backend
    }

    fn create(&self, blob: &ModelBlob) -> Result<Box<dyn TensorEngine>> {
        if let Some(declared) = blob.backend {
            if declared != self.backend {
                return Err(FaceError::Configuration(format!(
                    "model `{}` was exported for the {declared} backend, not {}",
                    blob.name, self.backend
                )));
            }
        }
        let mut engine = create_engine(self.backend);
        if let Some(threads) = self.threads {
            match engine.set_num_threads(threads) {
                Ok(()) => {}
                Err(FaceError::Unsupported { .. }) => {
                    log::warn!("{} backend ignores the thread count", self.backend);
                }
                Err(e) => return Err(e),
            }
        }
        log::info!("Using {} backend for model `{}`", self.backend, blob.name);
        Ok(engine)
    }
}
