//! Download item data model.
//!
//! One `DownloadItem` per asset; the scheduler owns the authoritative set and
//! is the only writer. Items are serde-serializable because the whole set is
//! persisted as a single snapshot (see `persist`).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::store::unix_timestamp;

/// Item identifier. Caller-supplied; the CLI derives it from the destination
/// filename.
pub type ItemId = String;

/// Lifecycle state of a download.
///
/// `Pending → Downloading → {Completed | Failed}`, with `Downloading ⇄ Paused`.
/// Cancel removes the item outright and so has no state of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Downloading,
    Paused,
    Completed,
    Failed { error: String },
}

impl ItemStatus {
    /// True for states no transition leaves without a new request.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed { .. })
    }

    /// Short lowercase label for status displays.
    pub fn label(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Downloading => "downloading",
            ItemStatus::Paused => "paused",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed { .. } => "failed",
        }
    }
}

/// Request handed to `Scheduler::enqueue`.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub id: ItemId,
    pub source_url: String,
    pub destination_path: PathBuf,
    pub display_title: String,
    pub group: Option<String>,
    /// Expected size when known up front (e.g. from a HEAD probe); the
    /// transfer corrects it once the server answers.
    pub size_hint: Option<u64>,
}

/// One tracked download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadItem {
    pub id: ItemId,
    pub source_url: String,
    pub destination_path: PathBuf,
    pub display_title: String,
    #[serde(default)]
    pub group: Option<String>,
    /// Total size in bytes; 0 until known.
    #[serde(default)]
    pub size_bytes: u64,
    /// Fraction complete in [0.0, 1.0]. Exactly 1.0 only when `Completed`.
    #[serde(default)]
    pub progress: f64,
    pub status: ItemStatus,
    /// Unix seconds at enqueue time; queue order follows it.
    pub created_at: i64,
    /// Opaque token for a future range-capable transport. Unused.
    #[serde(default)]
    pub resume_token: Option<String>,
}

impl DownloadItem {
    /// Build a fresh pending item from an enqueue request.
    pub fn from_request(req: DownloadRequest) -> Self {
        Self {
            id: req.id,
            source_url: req.source_url,
            destination_path: req.destination_path,
            display_title: req.display_title,
            group: req.group,
            size_bytes: req.size_hint.unwrap_or(0),
            progress: 0.0,
            status: ItemStatus::Pending,
            created_at: unix_timestamp(),
            resume_token: None,
        }
    }
}
