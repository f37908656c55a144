//! Event loop: applies executor progress and completion to the item set.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::item::ItemStatus;
use crate::transfer::{TransferError, TransferEvent};

use super::progress::ItemProgress;
use super::Inner;

/// Consumes executor events until the scheduler is torn down. Spawned once
/// per scheduler; runs for its whole lifetime.
pub(super) async fn run_event_loop(
    inner: Arc<Inner>,
    mut events_rx: mpsc::Receiver<TransferEvent>,
) {
    while let Some(event) = events_rx.recv().await {
        match event {
            TransferEvent::Progress {
                id,
                bytes_done,
                total_bytes,
            } => on_progress(&inner, &id, bytes_done, total_bytes),
            TransferEvent::Finished { id, result } => on_transfer_complete(&inner, &id, result),
        }
    }
}

fn on_progress(inner: &Inner, id: &str, bytes_done: u64, total_bytes: Option<u64>) {
    let update = {
        let mut guard = inner.state.lock().unwrap();
        let st = &mut *guard;
        if !st.active.contains(id) {
            return; // cancelled; the event is stale
        }
        let Some(item) = st.items.get_mut(id) else {
            return;
        };
        if let Some(total) = total_bytes {
            if item.size_bytes == 0 {
                item.size_bytes = total;
            }
        }
        if item.size_bytes > 0 {
            let fraction = bytes_done as f64 / item.size_bytes as f64;
            // 1.0 is reserved for Completed.
            item.progress = if fraction >= 1.0 { 0.99 } else { fraction };
        }
        let update = ItemProgress {
            id: item.id.clone(),
            display_title: item.display_title.clone(),
            bytes_done,
            total_bytes: item.size_bytes,
        };
        inner.persist_locked(st);
        update
    };
    if let Some(tx) = &inner.progress_tx {
        let _ = tx.try_send(update);
    }
}

/// Terminal outcome for one executor: record it, free the slot, admit the
/// next queued item.
fn on_transfer_complete(inner: &Inner, id: &str, result: Result<u64, TransferError>) {
    inner.control.unregister(id);

    enum Outcome {
        Completed(crate::item::DownloadItem),
        Failed(crate::item::DownloadItem),
        Discarded,
    }

    let (outcome, started) = {
        let mut guard = inner.state.lock().unwrap();
        let st = &mut *guard;
        if !st.active.remove(id) {
            // Cancelled while in flight; its slot was already released and
            // the result must not resurface.
            return;
        }
        let outcome = match st.items.get_mut(id) {
            None => Outcome::Discarded,
            Some(item) => match result {
                Ok(bytes) => {
                    item.status = ItemStatus::Completed;
                    item.progress = 1.0;
                    item.size_bytes = bytes;
                    Outcome::Completed(item.clone())
                }
                Err(e) => {
                    // Terminal for this attempt; progress stays where it was.
                    item.status = ItemStatus::Failed {
                        error: e.to_string(),
                    };
                    Outcome::Failed(item.clone())
                }
            },
        };
        let started = inner.admit_locked(st);
        inner.persist_locked(st);
        inner.notify_if_idle_locked(st);
        (outcome, started)
    };

    match &outcome {
        Outcome::Completed(item) => inner.effects.completed(item),
        Outcome::Failed(item) => inner.effects.failed(item),
        Outcome::Discarded => {}
    }
    inner.emit_started(&started);
}
