//! Compute device selection.
//!
//! The device is resolved once, at the start of a run, from the caller's
//! override and the number of accelerators ONNX Runtime can see. The result
//! is passed explicitly to the model loader.

use crate::error::ExtractError;
use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Where model inference runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Device {
    /// General-purpose compute.
    #[default]
    Cpu,
    /// CUDA GPU with the given ordinal.
    Cuda(u32),
}

impl Device {
    pub fn is_accelerator(&self) -> bool {
        matches!(self, Device::Cuda(_))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(id) => write!(f, "cuda:{id}"),
        }
    }
}

impl FromStr for Device {
    type Err = ExtractError;

    /// Accepts `cpu`, `cuda` (= `cuda:0`) and `cuda:N`, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda(0)),
            other => {
                let ordinal = other
                    .strip_prefix("cuda:")
                    .and_then(|n| n.parse::<u32>().ok())
                    .ok_or_else(|| {
                        ExtractError::InvalidConfig(format!(
                            "unknown device '{other}' (expected cpu, cuda or cuda:N)"
                        ))
                    })?;
                Ok(Device::Cuda(ordinal))
            }
        }
    }
}

/// Pick the device for a run.
///
/// An explicit override always wins. Otherwise the first accelerator is used
/// when at least one is available, else the CPU.
pub fn select_device(override_device: Option<Device>, accelerators: usize) -> Device {
    match override_device {
        Some(device) => device,
        None if accelerators > 0 => Device::Cuda(0),
        None => Device::Cpu,
    }
}

/// Number of CUDA accelerators usable by ONNX Runtime.
///
/// ONNX Runtime only reports whether the CUDA execution provider is usable,
/// so this is `1` or `0`.
pub fn accelerator_count() -> usize {
    match CUDAExecutionProvider::default().is_available() {
        Ok(true) => 1,
        Ok(false) => 0,
        Err(e) => {
            debug!("CUDA availability probe failed: {e}");
            0
        }
    }
}

/// Resolve the device for a run from the optional override.
pub fn resolve_device(override_device: Option<Device>) -> Device {
    let device = match override_device {
        Some(device) => device,
        None => select_device(None, accelerator_count()),
    };
    debug!("Selected compute device: {device}");
    device
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins() {
        assert_eq!(select_device(Some(Device::Cpu), 4), Device::Cpu);
        assert_eq!(select_device(Some(Device::Cuda(1)), 0), Device::Cuda(1));
    }

    #[test]
    fn prefers_first_accelerator() {
        assert_eq!(select_device(None, 2), Device::Cuda(0));
        assert_eq!(select_device(None, 0), Device::Cpu);
    }

    #[test]
    fn parse_devices() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("CUDA".parse::<Device>().unwrap(), Device::Cuda(0));
        assert_eq!("cuda:3".parse::<Device>().unwrap(), Device::Cuda(3));
        assert!("tpu".parse::<Device>().is_err());
        assert!("cuda:x".parse::<Device>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for d in [Device::Cpu, Device::Cuda(0), Device::Cuda(7)] {
            assert_eq!(d.to_string().parse::<Device>().unwrap(), d);
        }
    }
}
