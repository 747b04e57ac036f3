//! Engine endpoint and supervision settings.
//!
//! Configuration is rebuilt fresh on every supervisor start; nothing here is
//! cached across a stop/start cycle.

use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;

/// Reserved local port the engine is told to serve on.
pub const DEFAULT_ENGINE_PORT: u16 = 39291;

/// Health poll attempts before the engine is reported not ready.
pub const DEFAULT_HEALTH_ATTEMPTS: u32 = 10;

/// Hard cap on the process-manager teardown call.
pub const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(2);

static PORT_OVERRIDE: Lazy<Option<u16>> = Lazy::new(|| {
    std::env::var("WARDEN_ENGINE_PORT")
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
});

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Port the engine serves on; also baked into the spawn arguments.
    pub port: u16,
    /// Host data directory; resolved legacy model paths live under
    /// `<data_dir>/models/<id>/`.
    pub data_dir: PathBuf,
    /// Root directory holding one subdirectory per engine variant.
    pub engines_root: PathBuf,
    /// Health poll attempt budget.
    pub health_attempts: u32,
    /// Pause between health poll attempts.
    pub health_retry_delay: Duration,
    /// Timeout for the advisory teardown call.
    pub teardown_timeout: Duration,
}

impl EngineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let engines_root = data_dir.join("engines");
        Self {
            port: (*PORT_OVERRIDE).unwrap_or(DEFAULT_ENGINE_PORT),
            data_dir,
            engines_root,
            health_attempts: DEFAULT_HEALTH_ATTEMPTS,
            health_retry_delay: Duration::from_millis(500),
            teardown_timeout: TEARDOWN_TIMEOUT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_engines_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.engines_root = root.into();
        self
    }

    pub fn with_health_retry_delay(mut self, delay: Duration) -> Self {
        self.health_retry_delay = delay;
        self
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn socket_url(&self) -> String {
        format!("ws://127.0.0.1:{}/events", self.port)
    }

    pub fn models_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
