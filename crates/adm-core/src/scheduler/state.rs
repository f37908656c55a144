//! Authoritative scheduler state: item set, FIFO queue, active set.
//!
//! Pure data, no I/O. The scheduler serializes every mutation behind one
//! mutex; executors never touch this directly.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::item::{DownloadItem, ItemId, ItemStatus};

#[derive(Default)]
pub(super) struct SchedState {
    /// Every tracked item, keyed by id. The single source of truth.
    pub items: HashMap<ItemId, DownloadItem>,
    /// Ids awaiting admission, oldest first.
    pub queue: VecDeque<ItemId>,
    /// Ids with a live executor. Bounded by `max_concurrent`.
    pub active: HashSet<ItemId>,
}

impl SchedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted snapshot. Items stored as `Downloading` lost
    /// their executor with the previous process and are requeued; `Paused`
    /// items stay paused until an explicit resume.
    pub fn seed(&mut self, mut loaded: Vec<DownloadItem>) {
        loaded.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        for mut item in loaded {
            match item.status {
                ItemStatus::Downloading => {
                    tracing::debug!(id = %item.id, "requeueing download interrupted by shutdown");
                    item.status = ItemStatus::Pending;
                    self.queue.push_back(item.id.clone());
                }
                ItemStatus::Pending => self.queue.push_back(item.id.clone()),
                ItemStatus::Paused | ItemStatus::Completed | ItemStatus::Failed { .. } => {}
            }
            self.items.insert(item.id.clone(), item);
        }
    }

    /// True when the id holds a slot or a queue position.
    pub fn is_live(&self, id: &str) -> bool {
        self.active.contains(id) || self.queue.iter().any(|q| q == id)
    }

    /// Admit the queue head if a slot is free: marks it downloading and
    /// returns a copy for the caller to start an executor.
    pub fn pop_admittable(&mut self, max_concurrent: usize) -> Option<DownloadItem> {
        while self.active.len() < max_concurrent {
            let id = self.queue.pop_front()?;
            if let Some(item) = self.items.get_mut(&id) {
                item.status = ItemStatus::Downloading;
                self.active.insert(id);
                return Some(item.clone());
            }
            // A queued id without a record is stale; skip it.
        }
        None
    }

    /// Copy of the item set, oldest first.
    pub fn snapshot(&self) -> Vec<DownloadItem> {
        let mut items: Vec<DownloadItem> = self.items.values().cloned().collect();
        items.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        items
    }
}
