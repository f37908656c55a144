//! Per-item progress snapshots forwarded to UIs.

use crate::item::ItemId;

/// Progress of one in-flight download (CLI/UI friendly).
#[derive(Debug, Clone)]
pub struct ItemProgress {
    pub id: ItemId,
    pub display_title: String,
    /// Bytes written so far; non-decreasing for a given item.
    pub bytes_done: u64,
    /// Total size in bytes; 0 while unknown.
    pub total_bytes: u64,
}

impl ItemProgress {
    /// Fraction complete in [0.0, 1.0]; 0.0 while the total is unknown.
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.bytes_done as f64 / self.total_bytes as f64).min(1.0)
    }
}
