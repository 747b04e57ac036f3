#![cfg(unix)]

//! Real process supervision: spawn, liveness, idempotent teardown.
//!
//! A shell stub stands in for the engine binary; it accepts the server
//! arguments and sleeps. Engine readiness and model calls are served by a
//! mock on the configured port, which is all the supervisor ever observes.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;
use warden_engine::config::EngineConfig;
use warden_engine::gateway::EngineGateway;
use warden_engine::hardware::SystemInfo;
use warden_engine::supervisor::{EngineSupervisor, SupervisorError};
use warden_protocol::{EngineState, ModelRecord, ENGINE_LLAMACPP};

fn install_engine_stub(engines_root: &Path) {
    let dir = engines_root.join("noavx");
    std::fs::create_dir_all(&dir).expect("variant dir");
    let binary = dir.join("engine");
    std::fs::write(&binary, "#!/bin/sh\nsleep 30\n").expect("stub script");
    let mut perms = std::fs::metadata(&binary).expect("metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&binary, perms).expect("chmod");
}

fn process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// A loopback port with nothing behind it.
async fn dead_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    port
}

#[tokio::test]
async fn spawns_and_terminates_the_engine_process() {
    let data_dir = tempfile::tempdir().expect("tempdir");
    let config = EngineConfig::new(data_dir.path())
        .with_port(dead_port().await)
        .with_health_retry_delay(Duration::from_millis(5));
    install_engine_stub(&config.engines_root);

    let supervisor = EngineSupervisor::new(config);
    supervisor
        .start(&SystemInfo::cpu_only())
        .await
        .expect("spawn succeeds");
    assert_eq!(supervisor.current_state(), EngineState::Starting);
    let pid = supervisor.pid().await.expect("pid recorded");
    assert!(process_alive(pid));

    // Second start against a live process is refused; the invariant is one
    // engine per session.
    let err = supervisor
        .start(&SystemInfo::cpu_only())
        .await
        .expect_err("second start refused");
    assert!(matches!(err, SupervisorError::AlreadyRunning));

    supervisor.stop().await;
    assert_eq!(supervisor.current_state(), EngineState::Stopped);
    assert!(!process_alive(pid));

    // stop is idempotent.
    supervisor.stop().await;
    assert_eq!(supervisor.current_state(), EngineState::Stopped);
}

#[tokio::test]
async fn end_to_end_start_load_unload_stop() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/healthz");
            then.status(200);
        })
        .await;
    let start = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/models/start")
                .json_body_partial(r#"{"model": "m1", "engine": "llama-cpp"}"#);
            then.status(200).json_body(json!({}));
        })
        .await;
    let stop = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/models/stop");
            then.status(200).json_body(json!({}));
        })
        .await;

    let data_dir = tempfile::tempdir().expect("tempdir");
    let config = EngineConfig::new(data_dir.path())
        .with_port(server.port())
        .with_health_retry_delay(Duration::from_millis(5));
    install_engine_stub(&config.engines_root);

    let supervisor = EngineSupervisor::new(config.clone());
    supervisor
        .start(&SystemInfo::cpu_only())
        .await
        .expect("spawn succeeds");
    assert!(supervisor.wait_until_healthy().await);
    assert_eq!(supervisor.current_state(), EngineState::Running);
    let pid = supervisor.pid().await.expect("pid recorded");

    let gateway = EngineGateway::new(config);
    let model = ModelRecord {
        id: "m1".into(),
        engine: ENGINE_LLAMACPP.into(),
        ..ModelRecord::default()
    };
    gateway.load_model(&model).await.expect("load succeeds");
    gateway.unload_model("m1").await.expect("unload succeeds");
    start.assert_async().await;
    stop.assert_async().await;

    supervisor.stop().await;
    assert!(!process_alive(pid));
    supervisor.stop().await;
    assert_eq!(supervisor.current_state(), EngineState::Stopped);
}
