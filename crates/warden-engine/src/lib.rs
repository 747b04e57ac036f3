//! Supervisor and gateway for a locally-spawned inference engine process.
//!
//! The engine runs as an independent OS process listening on a reserved local
//! port; the host application talks to it only through this crate. Four
//! pieces cooperate:
//!
//! - [`supervisor::EngineSupervisor`] spawns the right engine variant for the
//!   detected hardware, polls its health endpoint, and tears it down.
//! - [`queue::RequestQueue`] serializes every engine call — the engine keeps
//!   one active model and must never see racing state transitions.
//! - [`gateway::EngineGateway`] translates typed model operations into the
//!   engine's REST surface, including the legacy-config translation shim.
//! - [`bridge::EventBridge`] turns the engine's raw byte-progress socket
//!   stream into aggregated events on the host bus.
//!
//! ```no_run
//! use warden_engine::config::EngineConfig;
//! use warden_engine::gateway::EngineGateway;
//! use warden_engine::supervisor::EngineSupervisor;
//! use warden_engine::hardware::SystemInfo;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = EngineConfig::new("/home/user/.local/share/app");
//! let supervisor = EngineSupervisor::new(config.clone());
//! supervisor.start(&SystemInfo::cpu_only()).await?;
//! if supervisor.wait_until_healthy().await {
//!     let gateway = EngineGateway::new(config);
//!     let models = gateway.list_models().await?;
//! }
//! supervisor.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod gateway;
pub mod hardware;
pub mod http;
pub mod process;
pub mod queue;
pub mod supervisor;
pub mod variant;

pub use bridge::{BridgeHandle, BridgeState, EventBridge};
pub use config::EngineConfig;
pub use gateway::{EngineGateway, GatewayError};
pub use hardware::{AcceleratorMode, CpuCapabilities, GpuConfig, SystemInfo};
pub use queue::RequestQueue;
pub use supervisor::{EngineSupervisor, SupervisorError};
