//! Shared HTTP client construction for engine calls.

use std::time::Duration;

use once_cell::sync::OnceCell;

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
}

fn connect_timeout() -> Duration {
    Duration::from_secs(env_u64("WARDEN_HTTP_CONNECT_TIMEOUT_SECS", 3).max(1))
}

fn keepalive() -> Duration {
    Duration::from_secs(env_u64("WARDEN_HTTP_TCP_KEEPALIVE_SECS", 60).max(1))
}

fn user_agent() -> String {
    format!("warden-engine/{}", env!("CARGO_PKG_VERSION"))
}

/// Base client builder with harmonized defaults. Apply per-call `.timeout(...)`
/// as needed; the engine is loopback so no global request timeout is set.
pub fn builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .user_agent(user_agent())
        .connect_timeout(connect_timeout())
        .tcp_keepalive(keepalive())
}

/// Shared default client for pooled engine calls.
pub fn client() -> &'static reqwest::Client {
    static CLIENT: OnceCell<reqwest::Client> = OnceCell::new();
    CLIENT.get_or_init(|| builder().build().expect("http client"))
}

/// A throwaway client that will not reuse pooled connections; health polling
/// wants an independent connection per attempt.
pub fn fresh_client() -> reqwest::Client {
    builder()
        .pool_max_idle_per_host(0)
        .build()
        .expect("http client")
}
