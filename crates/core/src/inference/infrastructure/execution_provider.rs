use ort::execution_providers::ExecutionProviderDispatch;

use crate::inference::domain::tensor_engine::BackendKind;

/// Execution providers registered for a backend, in preference order.
///
/// ONNX Runtime falls back to its CPU provider when none of these can be
/// registered, so an empty list means "CPU only".
pub fn execution_providers(backend: BackendKind) -> Vec<ExecutionProviderDispatch> {
    match backend {
        BackendKind::Portable => {
            vec![ort::execution_providers::CPUExecutionProvider::default().build()]
        }
        BackendKind::Npu => npu_providers(),
        BackendKind::Platform => platform_providers(),
    }
}

fn npu_providers() -> Vec<ExecutionProviderDispatch> {
    #[cfg(all(target_os = "linux", target_arch = "aarch64"))]
    {
        vec![ort::execution_providers::RKNPUExecutionProvider::default().build()]
    }
    #[cfg(not(all(target_os = "linux", target_arch = "aarch64")))]
    {
        log::warn!("No NPU execution provider on this target, running on CPU");
        vec![]
    }
}

fn platform_providers() -> Vec<ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        log::warn!("No platform ML execution provider on this target, running on CPU");
        vec![]
    }
}
