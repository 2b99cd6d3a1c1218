//! ONNX Runtime session construction for a resolved [`Device`].

use crate::device::{accelerator_count, Device};
use crate::error::ExtractError;
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use std::path::Path;
use tracing::debug;

/// Fail early when a CUDA device was requested but ONNX Runtime has no
/// usable CUDA execution provider.
pub fn ensure_device(device: Device) -> Result<(), ExtractError> {
    if device.is_accelerator() && accelerator_count() == 0 {
        return Err(ExtractError::DeviceUnavailable {
            device: device.to_string(),
            detail: "ONNX Runtime CUDA execution provider is not available \
                     (build with --features cuda and install CUDA/cuDNN)"
                .to_string(),
        });
    }
    Ok(())
}

/// Load one ONNX graph onto `device`.
pub fn load_session(path: &Path, device: Device) -> Result<Session, ExtractError> {
    let builder = Session::builder()
        .map_err(|e| load_failed(path, e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| load_failed(path, e))?;

    let builder = match device {
        Device::Cpu => builder.with_execution_providers([CPUExecutionProvider::default().build()]),
        Device::Cuda(id) => builder.with_execution_providers([
            CUDAExecutionProvider::default()
                .with_device_id(id as i32)
                .build(),
            CPUExecutionProvider::default().build(),
        ]),
    }
    .map_err(|e| ExtractError::DeviceUnavailable {
        device: device.to_string(),
        detail: e.to_string(),
    })?;

    let session = builder
        .commit_from_file(path)
        .map_err(|e| load_failed(path, e))?;
    debug!("Loaded {} on {}", path.display(), device);
    Ok(session)
}

fn load_failed(path: &Path, err: impl std::fmt::Display) -> ExtractError {
    ExtractError::SessionLoadFailed {
        path: path.to_path_buf(),
        detail: err.to_string(),
    }
}
