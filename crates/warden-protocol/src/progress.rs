//! Download task frames from the engine's event socket and their aggregation
//! into host-facing progress events.

use serde::{Deserialize, Serialize};

/// One JSON text frame from `ws://.../events`.
///
/// The discriminator is the engine's own (`download-started`,
/// `download-progress`, ...); the bridge republishes it verbatim and stays
/// agnostic to new values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskEventMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub task: DownloadTask,
}

/// The engine's unit of a download job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadTask {
    pub id: String,
    #[serde(default)]
    pub items: Vec<DownloadItem>,
}

/// File-level sub-progress inside a task.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DownloadItem {
    #[serde(default)]
    pub downloaded_bytes: u64,
    #[serde(default)]
    pub bytes: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TransferSize {
    pub transferred: u64,
    pub total: u64,
}

/// Aggregated progress event published on the host bus.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadProgressEvent {
    #[serde(rename = "modelId")]
    pub model_id: String,
    pub percent: f64,
    pub size: TransferSize,
}

/// Sum a task's item byte counters into one progress event.
///
/// Percent substitutes 1 for a zero numerator or denominator, so an all-zero
/// task reports 100 rather than NaN. That zero-guard is wire-compatible
/// behavior consumers rely on, not a rule worth fixing.
pub fn aggregate_progress(task: &DownloadTask) -> DownloadProgressEvent {
    let transferred: u64 = task.items.iter().map(|item| item.downloaded_bytes).sum();
    let total: u64 = task.items.iter().map(|item| item.bytes).sum();
    let numerator = if transferred == 0 { 1 } else { transferred };
    let denominator = if total == 0 { 1 } else { total };
    DownloadProgressEvent {
        model_id: task.id.clone(),
        percent: numerator as f64 / denominator as f64 * 100.0,
        size: TransferSize { transferred, total },
    }
}
