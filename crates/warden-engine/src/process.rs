//! Thin wrapper around the one engine OS process.

use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::supervisor::SupervisorError;
use crate::variant::EngineVariant;

// Windows resolves libraries from PATH, which is extended unconditionally.
#[cfg(target_os = "macos")]
const LIBRARY_PATH_VAR: &str = "DYLD_LIBRARY_PATH";
#[cfg(all(unix, not(target_os = "macos")))]
const LIBRARY_PATH_VAR: &str = "LD_LIBRARY_PATH";

/// One spawned engine process. Owned exclusively by the supervisor; at most
/// one instance is live per host session.
pub struct EngineProcess {
    child: Child,
    pid: Option<u32>,
}

fn append_search_path(cmd: &mut Command, var: &str, dir: &std::path::Path) {
    let mut paths: Vec<std::path::PathBuf> =
        std::env::split_paths(&std::env::var_os(var).unwrap_or_default()).collect();
    paths.push(dir.to_path_buf());
    match std::env::join_paths(paths) {
        Ok(joined) => {
            cmd.env(var, joined);
        }
        Err(err) => {
            warn!(
                target: "warden::supervisor",
                variable = var,
                error = %err,
                "skipping search-path extension"
            );
        }
    }
}

impl EngineProcess {
    /// Spawn the engine with the fixed server arguments, its library
    /// directory on the search path, and device visibility exported.
    pub fn spawn(
        config: &EngineConfig,
        variant: &EngineVariant,
    ) -> Result<Self, SupervisorError> {
        let mut cmd = Command::new(&variant.executable);
        cmd.arg("--start-server")
            .arg("--port")
            .arg(config.port.to_string())
            .current_dir(&variant.engine_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        append_search_path(&mut cmd, "PATH", &variant.engine_dir);
        #[cfg(not(windows))]
        append_search_path(&mut cmd, LIBRARY_PATH_VAR, &variant.engine_dir);

        cmd.env("ENGINE_PATH", &variant.engine_dir);
        if let Some(devices) = variant.cuda_visible_devices.as_deref() {
            cmd.env("CUDA_VISIBLE_DEVICES", devices);
        }
        if let Some(device) = variant.vulkan_device.as_deref() {
            cmd.env("GGML_VULKAN_DEVICE", device);
        }

        let child = cmd
            .spawn()
            .map_err(|err| SupervisorError::Spawn(err.to_string()))?;
        let pid = child.id();
        info!(
            target: "warden::supervisor",
            variant = %variant.name,
            pid = ?pid,
            port = config.port,
            "engine process spawned"
        );
        Ok(Self { child, pid })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the process has already exited on its own.
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Send the termination signal and reap the process. An already-exited
    /// process is success, not an error.
    pub async fn terminate(&mut self) {
        match self.child.start_kill() {
            Ok(()) => {
                let status = self.child.wait().await;
                debug!(
                    target: "warden::supervisor",
                    pid = ?self.pid,
                    status = ?status.ok(),
                    "engine process terminated"
                );
            }
            Err(err) if err.kind() == std::io::ErrorKind::InvalidInput => {
                // Child already reaped.
                debug!(target: "warden::supervisor", pid = ?self.pid, "engine process already exited");
            }
            Err(err) => {
                warn!(
                    target: "warden::supervisor",
                    pid = ?self.pid,
                    error = %err,
                    "engine termination signal failed"
                );
            }
        }
    }
}
