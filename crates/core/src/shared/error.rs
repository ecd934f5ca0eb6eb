use std::fmt::Display;
use std::path::PathBuf;

use thiserror::Error;

use crate::inference::domain::tensor_engine::BackendKind;
use crate::pipeline::capability::Capability;

/// Every failure the engine reports as an ordinary value.
///
/// Expected conditions (a disabled capability, a shape the backend cannot
/// serve, a missing model) never panic; they travel back through `Result`.
#[derive(Error, Debug)]
pub enum FaceError {
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("capability `{0}` is not initialized")]
    UninitializedCapability(Capability),
    #[error("{backend} backend does not support {operation}")]
    Unsupported {
        backend: BackendKind,
        operation: &'static str,
    },
    #[error("inference failed: {0}")]
    Execution(String),
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = FaceError> = std::result::Result<T, E>;

impl FaceError {
    pub fn configuration(err: impl Display) -> Self {
        FaceError::Configuration(err.to_string())
    }

    pub fn execution(err: impl Display) -> Self {
        FaceError::Execution(err.to_string())
    }

    /// True for failures that happen while loading or reconciling a model.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FaceError::Configuration(_) | FaceError::ModelNotFound(_) | FaceError::Io { .. }
        )
    }
}
