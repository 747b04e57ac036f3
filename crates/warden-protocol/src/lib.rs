//! Wire and domain types shared between the supervisor, the gateway, and the
//! event bridge.
//!
//! Everything here is plain data: the engine process state machine, model
//! records as the engine reports them, the recognized parameter projections
//! applied before records cross back into the host, and the download task
//! frames arriving on the engine's event socket.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod progress;

pub use progress::{aggregate_progress, DownloadItem, DownloadTask, TaskEventMessage};

/// Current identifier of the llama.cpp engine backend.
pub const ENGINE_LLAMACPP: &str = "llama-cpp";

/// Identifier the backend carried before its rename. Old persisted model
/// configs still declare it; [`remap_engine_id`] translates on the way out.
pub const ENGINE_GGML_LEGACY: &str = "ggml";

/// Legacy engine-setting key naming the local weight file.
pub const SETTING_MODEL_PATH: &str = "llama_model_path";

/// Legacy engine-setting key naming the vision projector file.
pub const SETTING_MMPROJ: &str = "mmproj";

/// Translate a declared engine identifier into the identifier the running
/// engine build understands. The single place that knows about the rename;
/// delete it once legacy configs are no longer expected.
pub fn remap_engine_id(engine: &str) -> &str {
    if engine == ENGINE_GGML_LEGACY {
        ENGINE_LLAMACPP
    } else {
        engine
    }
}

/// Lifecycle of the supervised engine process.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    #[default]
    Stopped,
    Starting,
    Running,
    Terminating,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Stopped => "stopped",
            EngineState::Starting => "starting",
            EngineState::Running => "running",
            EngineState::Terminating => "terminating",
        }
    }

    pub fn from_slug(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "starting" | "start" => EngineState::Starting,
            "running" | "ready" | "ok" => EngineState::Running,
            "terminating" => EngineState::Terminating,
            _ => EngineState::Stopped,
        }
    }
}

/// One download location for a model, optionally already materialized on disk.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ModelSource {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ModelMetadata {
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A model as the host sees it. The engine owns the authoritative copy; this
/// is a transient projection of one response.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ModelRecord {
    pub id: String,
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub sources: Vec<ModelSource>,
    #[serde(default)]
    pub metadata: ModelMetadata,
}

/// Engine-load settings the engine accepts on model start. Anything else the
/// record carries is host-internal and never forwarded.
const RECOGNIZED_SETTINGS: &[&str] = &[
    "ctx_len",
    "ngl",
    "embedding",
    "n_parallel",
    "cpu_threads",
    "prompt_template",
    "pre_prompt",
    "system_prompt",
    "ai_prompt",
    "user_prompt",
    "llama_model_path",
    "mmproj",
    "cont_batching",
    "vision_model",
    "text_model",
    "cache_type",
    "use_mmap",
    "cache_enabled",
    "flash_attn",
];

/// Runtime sampling parameters recognized on inference requests.
const RECOGNIZED_PARAMETERS: &[&str] = &[
    "temperature",
    "token_limit",
    "top_k",
    "top_p",
    "stream",
    "max_tokens",
    "stop",
    "frequency_penalty",
    "presence_penalty",
];

fn project(source: &Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    let wanted: BTreeSet<&str> = keys.iter().copied().collect();
    source
        .iter()
        .filter(|(key, _)| wanted.contains(key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Keep only the recognized engine-load settings.
pub fn filter_load_settings(source: &Map<String, Value>) -> Map<String, Value> {
    project(source, RECOGNIZED_SETTINGS)
}

/// Keep only the recognized runtime parameters.
pub fn filter_runtime_parameters(source: &Map<String, Value>) -> Map<String, Value> {
    project(source, RECOGNIZED_PARAMETERS)
}

/// Normalize a raw engine model object into a [`ModelRecord`].
///
/// The engine reports models as one flat object; `settings` and `parameters`
/// become filtered projections of it, and records without metadata gain the
/// empty default so downstream consumers never see an absent field.
pub fn normalize_model(raw: &Value) -> ModelRecord {
    let obj = raw.as_object().cloned().unwrap_or_default();
    let id = obj
        .get("id")
        .or_else(|| obj.get("model"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let engine = obj
        .get("engine")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let sources = obj
        .get("sources")
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default();
    ModelRecord {
        id,
        engine,
        settings: filter_load_settings(&obj),
        parameters: filter_runtime_parameters(&obj),
        sources,
        metadata: ModelMetadata::default(),
    }
}
