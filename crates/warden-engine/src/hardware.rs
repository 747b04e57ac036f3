//! Hardware capability description handed to the supervisor by the host.
//!
//! The host probes GPUs and CPU features through its own channels; the
//! supervisor only consumes the result when choosing an engine variant.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AcceleratorMode {
    #[default]
    Cpu,
    Cuda,
    Vulkan,
}

impl AcceleratorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcceleratorMode::Cpu => "cpu",
            AcceleratorMode::Cuda => "cuda",
            AcceleratorMode::Vulkan => "vulkan",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct CpuCapabilities {
    /// Instruction-set extensions reported by the host, lowercase
    /// (`"avx"`, `"avx2"`, `"avx512"`).
    #[serde(default)]
    pub instructions: Vec<String>,
}

impl CpuCapabilities {
    pub fn supports(&self, instruction: &str) -> bool {
        self.instructions
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(instruction))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct GpuConfig {
    pub mode: AcceleratorMode,
    #[serde(default)]
    pub cuda_version: Option<String>,
    /// Device ids selected for use, in preference order.
    #[serde(default)]
    pub visible_devices: Vec<String>,
    /// Vulkan device ids; only the first is exposed to the engine.
    #[serde(default)]
    pub vulkan_devices: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct SystemInfo {
    #[serde(default)]
    pub cpu: CpuCapabilities,
    #[serde(default)]
    pub gpu: Option<GpuConfig>,
}

impl SystemInfo {
    /// A host with no usable accelerator and a baseline CPU.
    pub fn cpu_only() -> Self {
        Self::default()
    }

    pub fn accelerator(&self) -> AcceleratorMode {
        self.gpu
            .as_ref()
            .map(|gpu| gpu.mode)
            .unwrap_or(AcceleratorMode::Cpu)
    }
}
