//! Read-only projections over a scheduler snapshot.
//!
//! Pure derivation, recomputed from the snapshot it is built over; holds no
//! state of its own. Linear scans are fine at the expected scale (tens to
//! low hundreds of items).

use crate::item::{DownloadItem, ItemStatus};

/// Queryable views over one snapshot of the item set.
pub struct DownloadsView {
    items: Vec<DownloadItem>,
}

impl DownloadsView {
    pub fn new(items: Vec<DownloadItem>) -> Self {
        Self { items }
    }

    /// Items currently transferring.
    pub fn active(&self) -> Vec<&DownloadItem> {
        self.with_status(|s| *s == ItemStatus::Downloading)
    }

    /// Items awaiting admission.
    pub fn queued(&self) -> Vec<&DownloadItem> {
        self.with_status(|s| *s == ItemStatus::Pending)
    }

    pub fn paused(&self) -> Vec<&DownloadItem> {
        self.with_status(|s| *s == ItemStatus::Paused)
    }

    pub fn completed(&self) -> Vec<&DownloadItem> {
        self.with_status(|s| *s == ItemStatus::Completed)
    }

    pub fn failed(&self) -> Vec<&DownloadItem> {
        self.with_status(|s| matches!(s, ItemStatus::Failed { .. }))
    }

    /// Bytes held by completed downloads.
    pub fn total_bytes_used(&self) -> u64 {
        self.completed().iter().map(|i| i.size_bytes).sum()
    }

    pub fn is_busy(&self) -> bool {
        !self.active().is_empty()
    }

    pub fn by_id(&self, id: &str) -> Option<&DownloadItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn by_group(&self, group: &str) -> Vec<&DownloadItem> {
        self.items
            .iter()
            .filter(|i| i.group.as_deref() == Some(group))
            .collect()
    }

    /// Every item in the snapshot, oldest first.
    pub fn all(&self) -> &[DownloadItem] {
        &self.items
    }

    fn with_status(&self, pred: impl Fn(&ItemStatus) -> bool) -> Vec<&DownloadItem> {
        self.items.iter().filter(|i| pred(&i.status)).collect()
    }
}
