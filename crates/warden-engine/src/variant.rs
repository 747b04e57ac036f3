//! Engine executable variant selection.
//!
//! The engines root holds one directory per build variant; each directory
//! carries the engine binary plus the runtime libraries it was linked
//! against. Selection prefers the accelerator the host reports, then the
//! widest CPU instruction set available.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::hardware::{AcceleratorMode, SystemInfo};
use crate::supervisor::SupervisorError;

#[cfg(windows)]
const EXECUTABLE_NAME: &str = "engine.exe";
#[cfg(not(windows))]
const EXECUTABLE_NAME: &str = "engine";

/// A chosen engine build: where its binary and library directory live, and
/// which device-visibility values to export when spawning it.
#[derive(Clone, Debug)]
pub struct EngineVariant {
    pub name: String,
    pub executable: PathBuf,
    pub engine_dir: PathBuf,
    pub cuda_visible_devices: Option<String>,
    pub vulkan_device: Option<String>,
}

fn cpu_tier(info: &SystemInfo) -> &'static str {
    if info.cpu.supports("avx512") {
        "avx512"
    } else if info.cpu.supports("avx2") {
        "avx2"
    } else if info.cpu.supports("avx") {
        "avx"
    } else {
        "noavx"
    }
}

pub fn select_variant(
    engines_root: &Path,
    info: &SystemInfo,
) -> Result<EngineVariant, SupervisorError> {
    let mut cuda_visible_devices = None;
    let mut vulkan_device = None;
    let name = match info.accelerator() {
        AcceleratorMode::Cuda => {
            let gpu = info.gpu.as_ref();
            if let Some(devices) = gpu.filter(|gpu| !gpu.visible_devices.is_empty()) {
                cuda_visible_devices = Some(devices.visible_devices.join(","));
            }
            match gpu.and_then(|gpu| gpu.cuda_version.as_deref()) {
                Some(version) => format!("cuda-{version}"),
                None => "cuda".to_string(),
            }
        }
        AcceleratorMode::Vulkan => {
            // One device at a time for the vulkan backend.
            vulkan_device = info
                .gpu
                .as_ref()
                .and_then(|gpu| gpu.vulkan_devices.first())
                .cloned();
            "vulkan".to_string()
        }
        AcceleratorMode::Cpu => cpu_tier(info).to_string(),
    };

    let engine_dir = engines_root.join(&name);
    let executable = engine_dir.join(EXECUTABLE_NAME);
    if !executable.is_file() {
        return Err(SupervisorError::MissingExecutable(executable));
    }
    debug!(
        target: "warden::supervisor",
        variant = %name,
        executable = %executable.display(),
        "engine variant selected"
    );
    Ok(EngineVariant {
        name,
        executable,
        engine_dir,
        cuda_visible_devices,
        vulkan_device,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{CpuCapabilities, GpuConfig};

    fn install_variant(root: &Path, name: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).expect("variant dir");
        std::fs::write(dir.join(EXECUTABLE_NAME), b"").expect("binary stub");
    }

    #[test]
    fn picks_widest_cpu_tier_present() {
        let root = tempfile::tempdir().expect("tempdir");
        install_variant(root.path(), "avx2");
        let info = SystemInfo {
            cpu: CpuCapabilities {
                instructions: vec!["avx".into(), "avx2".into()],
            },
            gpu: None,
        };
        let variant = select_variant(root.path(), &info).expect("variant");
        assert_eq!(variant.name, "avx2");
        assert!(variant.cuda_visible_devices.is_none());
    }

    #[test]
    fn cuda_variant_carries_device_list_and_version() {
        let root = tempfile::tempdir().expect("tempdir");
        install_variant(root.path(), "cuda-12.0");
        let info = SystemInfo {
            cpu: CpuCapabilities::default(),
            gpu: Some(GpuConfig {
                mode: AcceleratorMode::Cuda,
                cuda_version: Some("12.0".into()),
                visible_devices: vec!["0".into(), "1".into()],
                vulkan_devices: Vec::new(),
            }),
        };
        let variant = select_variant(root.path(), &info).expect("variant");
        assert_eq!(variant.name, "cuda-12.0");
        assert_eq!(variant.cuda_visible_devices.as_deref(), Some("0,1"));
    }

    #[test]
    fn vulkan_variant_exposes_only_first_device() {
        let root = tempfile::tempdir().expect("tempdir");
        install_variant(root.path(), "vulkan");
        let info = SystemInfo {
            cpu: CpuCapabilities::default(),
            gpu: Some(GpuConfig {
                mode: AcceleratorMode::Vulkan,
                cuda_version: None,
                visible_devices: Vec::new(),
                vulkan_devices: vec!["2".into(), "3".into()],
            }),
        };
        let variant = select_variant(root.path(), &info).expect("variant");
        assert_eq!(variant.vulkan_device.as_deref(), Some("2"));
    }

    #[test]
    fn missing_binary_is_a_hard_error() {
        let root = tempfile::tempdir().expect("tempdir");
        let err = select_variant(root.path(), &SystemInfo::cpu_only())
            .expect_err("missing executable");
        assert!(matches!(err, SupervisorError::MissingExecutable(_)));
    }
}
