//! Typed client for the engine's local REST surface.
//!
//! Every operation is submitted through the [`RequestQueue`]; the engine's
//! single-active-model state must never see two calls in flight. Reads ride
//! the same queue as mutations — determinism is worth more here than the
//! marginal parallelism.

use std::path::Path;

use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use warden_protocol::{
    filter_load_settings, normalize_model, remap_engine_id, ModelRecord, ENGINE_GGML_LEGACY,
    SETTING_MMPROJ, SETTING_MODEL_PATH,
};

use crate::config::EngineConfig;
use crate::http;
use crate::queue::{QueueClosed, RequestQueue};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The engine was unreachable or the connection failed mid-request.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    /// Non-2xx answer carrying the engine's own JSON diagnostic.
    #[error("engine returned HTTP {status}: {body}")]
    Engine { status: u16, body: Value },
    /// Non-2xx answer without a parseable body.
    #[error("engine returned HTTP {0}")]
    Status(u16),
    #[error(transparent)]
    Queue(#[from] QueueClosed),
}

/// Gateway to the engine's model API.
pub struct EngineGateway {
    config: EngineConfig,
    client: reqwest::Client,
    queue: RequestQueue,
}

impl EngineGateway {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            client: http::client().clone(),
            queue: RequestQueue::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), path)
    }

    /// Start a model on the engine.
    ///
    /// Legacy records (`engine == "ggml"`) get their local weight-file and
    /// vision-projector settings resolved to absolute paths first; any other
    /// engine has those settings stripped. The declared engine identifier is
    /// remapped through the rename shim before it goes on the wire. Non-2xx
    /// answers surface the engine's own error body.
    pub async fn load_model(&self, model: &ModelRecord) -> Result<Value, GatewayError> {
        let body = build_load_request(model, self.config.data_dir());
        let request = self.client.post(self.url("/v1/models/start")).json(&body);
        self.queue.submit(send_unwrap_engine_error(request)).await?
    }

    pub async fn unload_model(&self, id: &str) -> Result<(), GatewayError> {
        let request = self
            .client
            .post(self.url("/v1/models/stop"))
            .json(&json!({ "model": id }));
        self.queue.submit(send_json(request)).await??;
        Ok(())
    }

    /// Ask the engine to download a model; same error-body unwrapping as
    /// load. Progress arrives on the event socket, not in this response.
    pub async fn pull_model(&self, id: &str) -> Result<Value, GatewayError> {
        let request = self
            .client
            .post(self.url("/v1/models/pull"))
            .json(&json!({ "model": id }));
        self.queue.submit(send_unwrap_engine_error(request)).await?
    }

    /// Cancel a running pull by its task id. Cancellation is engine-side;
    /// the original pull request is not aborted from the host.
    pub async fn cancel_model_pull(&self, task_id: &str) -> Result<(), GatewayError> {
        let request = self
            .client
            .delete(self.url("/models/pull"))
            .json(&json!({ "taskId": task_id }));
        self.queue.submit(send_json(request)).await??;
        Ok(())
    }

    /// Advisory: register an on-disk model file with the engine. Failure
    /// must not block the caller, so it is routed to diagnostics only.
    pub async fn import_model(&self, id: &str, path: &str) {
        let request = self
            .client
            .post(self.url("/v1/models/import"))
            .json(&json!({ "model": id, "modelPath": path }));
        match self.queue.submit(send_json(request)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                debug!(target: "warden::gateway", model = id, error = %err, "model import failed")
            }
            Err(err) => {
                debug!(target: "warden::gateway", model = id, error = %err, "model import not submitted")
            }
        }
    }

    pub async fn delete_model(&self, id: &str) -> Result<(), GatewayError> {
        let request = self.client.delete(self.url(&format!("/models/{id}")));
        self.queue.submit(send_json(request)).await??;
        Ok(())
    }

    pub async fn update_model(&self, id: &str, patch: Value) -> Result<(), GatewayError> {
        let request = self
            .client
            .patch(self.url(&format!("/v1/models/{id}")))
            .json(&patch);
        self.queue.submit(send_json(request)).await??;
        Ok(())
    }

    pub async fn get_model(&self, id: &str) -> Result<ModelRecord, GatewayError> {
        let request = self.client.get(self.url(&format!("/v1/models/{id}")));
        let value = self.queue.submit(send_json(request)).await??;
        Ok(normalize_model(&value))
    }

    /// List models known to the engine; a malformed list payload yields an
    /// empty list rather than an error.
    pub async fn list_models(&self) -> Result<Vec<ModelRecord>, GatewayError> {
        let request = self.client.get(self.url("/models"));
        let value = self.queue.submit(send_json(request)).await??;
        let records = value
            .get("data")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().map(normalize_model).collect())
            .unwrap_or_default();
        Ok(records)
    }

    /// Poll the health endpoint, retrying transport failures and 5xx answers
    /// up to the configured budget. Never fails — exhaustion is `false`.
    pub async fn health_check(&self) -> bool {
        let client = self.client.clone();
        let url = self.url("/healthz");
        let attempts = self.config.health_attempts;
        let delay = self.config.health_retry_delay;
        let poll = async move {
            for attempt in 1..=attempts {
                match client.get(&url).send().await {
                    Ok(resp) if resp.status().is_success() => return true,
                    Ok(resp) if resp.status().is_server_error() => {
                        debug!(
                            target: "warden::gateway",
                            attempt,
                            status = resp.status().as_u16(),
                            "health check failed"
                        );
                    }
                    Ok(resp) => {
                        debug!(
                            target: "warden::gateway",
                            status = resp.status().as_u16(),
                            "health check rejected"
                        );
                        return false;
                    }
                    Err(err) => {
                        debug!(target: "warden::gateway", attempt, error = %err, "health check unreachable");
                    }
                }
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
            false
        };
        self.queue.submit(poll).await.unwrap_or(false)
    }

    /// Advisory teardown of the engine's process manager, capped at the
    /// configured timeout. Never raises — it runs on extension teardown and
    /// on unexpected host exit, where the engine may already be gone.
    pub async fn cleanup(&self) {
        let request = self
            .client
            .delete(self.url("/processmanager/destroy"))
            .timeout(self.config.teardown_timeout);
        match request.send().await {
            Ok(resp) => {
                debug!(
                    target: "warden::gateway",
                    status = resp.status().as_u16(),
                    "engine teardown acknowledged"
                );
            }
            Err(err) => {
                debug!(target: "warden::gateway", error = %err, "engine teardown skipped");
            }
        }
    }
}

/// Send a request, mapping a non-2xx answer to [`GatewayError::Status`].
/// Empty and non-JSON success bodies collapse to `Value::Null`.
async fn send_json(request: reqwest::RequestBuilder) -> Result<Value, GatewayError> {
    let resp = request.send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(GatewayError::Status(status.as_u16()));
    }
    let text = resp.text().await?;
    Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
}

/// Like [`send_json`], but a non-2xx answer re-raises the engine's JSON error
/// body verbatim so the caller sees the engine's own diagnostic.
async fn send_unwrap_engine_error(
    request: reqwest::RequestBuilder,
) -> Result<Value, GatewayError> {
    let resp = request.send().await?;
    let status = resp.status();
    if status.is_success() {
        let text = resp.text().await?;
        return Ok(serde_json::from_str(&text).unwrap_or(Value::Null));
    }
    match resp.json::<Value>().await {
        Ok(body) => Err(GatewayError::Engine {
            status: status.as_u16(),
            body,
        }),
        Err(err) => {
            warn!(target: "warden::gateway", error = %err, "engine error body unreadable");
            Err(GatewayError::Status(status.as_u16()))
        }
    }
}

/// Resolve a legacy weight-file setting to an absolute path: a local,
/// existing source path wins verbatim; everything else lands under the host
/// data directory.
fn resolve_model_file_path(model: &ModelRecord, file: &str, data_dir: &Path) -> String {
    if let Some(source) = model.sources.first() {
        if !source.url.starts_with("http") && Path::new(&source.url).exists() {
            return source.url.clone();
        }
    }
    data_dir
        .join("models")
        .join(&model.id)
        .join(file)
        .to_string_lossy()
        .into_owned()
}

/// Assemble the model-start body: resolved-or-stripped legacy settings,
/// filtered to the recognized load set, plus the id and the remapped engine.
fn build_load_request(model: &ModelRecord, data_dir: &Path) -> Map<String, Value> {
    let mut settings = model.settings.clone();
    if model.engine == ENGINE_GGML_LEGACY {
        for key in [SETTING_MODEL_PATH, SETTING_MMPROJ] {
            if let Some(file) = settings.get(key).and_then(Value::as_str).map(str::to_owned) {
                let resolved = resolve_model_file_path(model, &file, data_dir);
                settings.insert(key.to_string(), Value::String(resolved));
            }
        }
    } else {
        settings.remove(SETTING_MODEL_PATH);
        settings.remove(SETTING_MMPROJ);
    }
    let mut body = filter_load_settings(&settings);
    body.insert("model".into(), Value::String(model.id.clone()));
    body.insert(
        "engine".into(),
        Value::String(remap_engine_id(&model.engine).to_string()),
    );
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_protocol::{ModelSource, ENGINE_LLAMACPP};

    fn legacy_model(id: &str, source_url: &str, model_path: &str) -> ModelRecord {
        let mut settings = Map::new();
        settings.insert(
            SETTING_MODEL_PATH.into(),
            Value::String(model_path.to_string()),
        );
        settings.insert("ctx_len".into(), json!(2048));
        ModelRecord {
            id: id.into(),
            engine: ENGINE_GGML_LEGACY.into(),
            settings,
            sources: vec![ModelSource {
                url: source_url.into(),
                file_path: None,
            }],
            ..ModelRecord::default()
        }
    }

    #[test]
    fn legacy_local_existing_source_is_used_verbatim() {
        let dir = tempfile::tempdir().expect("tempdir");
        let weights = dir.path().join("weights.gguf");
        std::fs::write(&weights, b"gguf").expect("weights fixture");
        let local = weights.to_string_lossy().into_owned();

        let model = legacy_model("m1", &local, "weights.gguf");
        let body = build_load_request(&model, Path::new("/data"));
        assert_eq!(body.get(SETTING_MODEL_PATH), Some(&Value::String(local)));
    }

    #[test]
    fn legacy_remote_source_resolves_under_data_dir() {
        let model = legacy_model("m1", "https://example.com/weights.gguf", "weights.gguf");
        let body = build_load_request(&model, Path::new("/data"));
        let expected = Path::new("/data")
            .join("models")
            .join("m1")
            .join("weights.gguf")
            .to_string_lossy()
            .into_owned();
        assert_eq!(body.get(SETTING_MODEL_PATH), Some(&Value::String(expected)));
    }

    #[test]
    fn current_engine_strips_legacy_path_settings() {
        let mut model = legacy_model("m1", "https://example.com/weights.gguf", "weights.gguf");
        model.engine = ENGINE_LLAMACPP.into();
        model
            .settings
            .insert(SETTING_MMPROJ.into(), json!("mmproj.gguf"));
        let body = build_load_request(&model, Path::new("/data"));
        assert!(!body.contains_key(SETTING_MODEL_PATH));
        assert!(!body.contains_key(SETTING_MMPROJ));
        assert_eq!(body.get("engine"), Some(&json!(ENGINE_LLAMACPP)));
    }

    #[test]
    fn legacy_engine_identifier_is_remapped_on_the_wire() {
        let model = legacy_model("m1", "https://example.com/weights.gguf", "weights.gguf");
        let body = build_load_request(&model, Path::new("/data"));
        assert_eq!(body.get("engine"), Some(&json!(ENGINE_LLAMACPP)));
        assert_eq!(body.get("model"), Some(&json!("m1")));
    }

    #[test]
    fn load_body_keeps_only_recognized_settings() {
        let mut model = legacy_model("m1", "https://example.com/weights.gguf", "weights.gguf");
        model.settings.insert("internal_flag".into(), json!(true));
        let body = build_load_request(&model, Path::new("/data"));
        assert!(!body.contains_key("internal_flag"));
        assert_eq!(body.get("ctx_len"), Some(&json!(2048)));
    }
}
