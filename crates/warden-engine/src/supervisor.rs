//! Engine process lifecycle supervision.
//!
//! Stopped → Starting (spawn) → Running (health check passes) →
//! Terminating (stop) → Stopped. Nothing is reused across a stop/start
//! cycle; variant selection and environment are rebuilt on every start.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use warden_events::Bus;
use warden_protocol::EngineState;

use crate::config::EngineConfig;
use crate::hardware::SystemInfo;
use crate::http;
use crate::process::EngineProcess;
use crate::variant::select_variant;

/// Bus topic announcing engine state transitions.
pub const TOPIC_ENGINE_STATE: &str = "engine.state.changed";

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("engine executable not found at {0}")]
    MissingExecutable(PathBuf),
    #[error("engine spawn failed: {0}")]
    Spawn(String),
    #[error("engine process already running")]
    AlreadyRunning,
}

/// Owns the one engine process of the host session.
///
/// Constructed at session start and dropped at session end; there is no
/// ambient global handle.
pub struct EngineSupervisor {
    config: EngineConfig,
    state_tx: watch::Sender<EngineState>,
    process: Mutex<Option<EngineProcess>>,
    bus: Option<Bus>,
}

impl EngineSupervisor {
    pub fn new(config: EngineConfig) -> Self {
        let (state_tx, _) = watch::channel(EngineState::Stopped);
        Self {
            config,
            state_tx,
            process: Mutex::new(None),
            bus: None,
        }
    }

    /// Announce state transitions on the host bus as well.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Observe lifecycle transitions.
    pub fn state(&self) -> watch::Receiver<EngineState> {
        self.state_tx.subscribe()
    }

    pub fn current_state(&self) -> EngineState {
        *self.state_tx.borrow()
    }

    /// OS pid of the supervised process, when one is live.
    pub async fn pid(&self) -> Option<u32> {
        self.process.lock().await.as_ref().and_then(|p| p.pid())
    }

    fn set_state(&self, state: EngineState) {
        self.state_tx.send_replace(state);
        if let Some(bus) = &self.bus {
            bus.publish(
                TOPIC_ENGINE_STATE,
                &serde_json::json!({ "state": state.as_str() }),
            );
        }
    }

    /// Select the engine variant for the reported hardware and launch it.
    ///
    /// Returns once the process is spawned; readiness is a separate concern
    /// (see [`wait_until_healthy`](Self::wait_until_healthy)). Spawn failures
    /// are fatal and surface to the caller.
    pub async fn start(&self, info: &SystemInfo) -> Result<(), SupervisorError> {
        let mut guard = self.process.lock().await;
        if let Some(existing) = guard.as_mut() {
            if !existing.has_exited() {
                return Err(SupervisorError::AlreadyRunning);
            }
            *guard = None;
        }
        self.set_state(EngineState::Starting);
        let launched = select_variant(&self.config.engines_root, info)
            .and_then(|variant| EngineProcess::spawn(&self.config, &variant));
        match launched {
            Ok(process) => {
                *guard = Some(process);
                Ok(())
            }
            Err(err) => {
                self.set_state(EngineState::Stopped);
                Err(err)
            }
        }
    }

    /// Poll the engine's health endpoint until it answers or the attempt
    /// budget runs out.
    ///
    /// Each attempt uses an independent connection; refusals, timeouts, and
    /// non-2xx responses all consume one attempt. Exhaustion reports the
    /// engine not ready — the process is left running and the next explicit
    /// operation may retry.
    pub async fn wait_until_healthy(&self) -> bool {
        let url = format!("{}/healthz", self.config.base_url());
        for attempt in 1..=self.config.health_attempts {
            let client = http::fresh_client();
            match client
                .get(&url)
                .timeout(Duration::from_secs(5))
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    info!(
                        target: "warden::supervisor",
                        attempt,
                        "engine answered health check"
                    );
                    self.set_state(EngineState::Running);
                    return true;
                }
                Ok(resp) => {
                    debug!(
                        target: "warden::supervisor",
                        attempt,
                        status = resp.status().as_u16(),
                        "health check rejected"
                    );
                }
                Err(err) => {
                    debug!(
                        target: "warden::supervisor",
                        attempt,
                        error = %err,
                        "health check unreachable"
                    );
                }
            }
            if attempt < self.config.health_attempts {
                tokio::time::sleep(self.config.health_retry_delay).await;
            }
        }
        warn!(
            target: "warden::supervisor",
            attempts = self.config.health_attempts,
            "engine not ready within health budget"
        );
        false
    }

    /// Best-effort teardown: ask the engine's process manager to destroy
    /// itself, then send the termination signal regardless of the answer.
    ///
    /// Runs on normal unload and on forced application exit, so it is
    /// idempotent and never raises; failures go to diagnostics only.
    pub async fn stop(&self) {
        self.set_state(EngineState::Terminating);
        let destroy_url = format!("{}/processmanager/destroy", self.config.base_url());
        match http::client()
            .delete(&destroy_url)
            .timeout(self.config.teardown_timeout)
            .send()
            .await
        {
            Ok(resp) => {
                debug!(
                    target: "warden::supervisor",
                    status = resp.status().as_u16(),
                    "engine teardown acknowledged"
                );
            }
            Err(err) => {
                debug!(
                    target: "warden::supervisor",
                    error = %err,
                    "engine teardown call failed; terminating process anyway"
                );
            }
        }
        if let Some(mut process) = self.process.lock().await.take() {
            process.terminate().await;
        }
        self.set_state(EngineState::Stopped);
    }
}
