//! Debounced persistence of the download item set.
//!
//! `schedule_save` never blocks the caller: snapshots go to an owned debounce
//! task that writes the latest one after a quiet window. Durable failures are
//! logged, never raised; the scheduler's in-memory set stays authoritative.
//! The task is torn down deterministically via `shutdown`, which also flushes
//! any pending snapshot.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::item::DownloadItem;
use crate::store::KvStore;

/// Durable key holding the serialized item set.
const ITEMS_KEY: &str = "downloads/items";

/// Bump when the snapshot shape changes; unknown versions are not guessed at.
const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    items: Vec<DownloadItem>,
}

enum Cmd {
    Save(Vec<DownloadItem>),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Debounced writer for the authoritative item set.
pub struct PersistenceGateway {
    store: KvStore,
    tx: mpsc::UnboundedSender<Cmd>,
    task: Mutex<Option<JoinHandle<()>>>,
    writes: Arc<AtomicU64>,
}

impl PersistenceGateway {
    /// Spawn the debounce task. Must be called within a tokio runtime.
    pub fn new(store: KvStore, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let writes = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(run_debounce_loop(
            rx,
            store.clone(),
            debounce,
            Arc::clone(&writes),
        ));
        Self {
            store,
            tx,
            task: Mutex::new(Some(task)),
            writes,
        }
    }

    /// Queue the latest snapshot for a durable write. Rapid successive calls
    /// within the debounce window coalesce into one write. Never blocks.
    pub fn schedule_save(&self, items: Vec<DownloadItem>) {
        // Send failure means the task is gone (post-shutdown); drop the save.
        let _ = self.tx.send(Cmd::Save(items));
    }

    /// Write any pending snapshot now and wait for it to land.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Cmd::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }

    /// Flush pending state and stop the debounce task.
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Cmd::Shutdown(ack)).is_ok() {
            let _ = done.await;
        }
        let task = self.task.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Read the last durable snapshot. Missing, unreadable, or
    /// unknown-version data is logged and treated as an empty set.
    pub async fn load(&self) -> Vec<DownloadItem> {
        let bytes = match self.store.get(ITEMS_KEY).await {
            Ok(Some(b)) => b,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!("could not read item snapshot: {e:#}");
                return Vec::new();
            }
        };
        match serde_json::from_slice::<Snapshot>(&bytes) {
            Ok(snap) if snap.version == SCHEMA_VERSION => snap.items,
            Ok(snap) => {
                tracing::warn!(
                    found = snap.version,
                    expected = SCHEMA_VERSION,
                    "item snapshot has unknown schema version, starting empty"
                );
                Vec::new()
            }
            Err(e) => {
                tracing::warn!("item snapshot unreadable, starting empty: {e}");
                Vec::new()
            }
        }
    }

    /// Number of durable snapshot writes performed so far.
    pub fn durable_writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

async fn run_debounce_loop(
    mut rx: mpsc::UnboundedReceiver<Cmd>,
    store: KvStore,
    debounce: Duration,
    writes: Arc<AtomicU64>,
) {
    let mut pending: Option<Vec<DownloadItem>> = None;
    let mut deadline = Instant::now();
    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Cmd::Save(items)) => {
                    // The window opens at the first unsaved change; later
                    // saves within it only replace the snapshot.
                    if pending.is_none() {
                        deadline = Instant::now() + debounce;
                    }
                    pending = Some(items);
                }
                Some(Cmd::Flush(ack)) => {
                    if let Some(items) = pending.take() {
                        write_snapshot(&store, items, &writes).await;
                    }
                    let _ = ack.send(());
                }
                Some(Cmd::Shutdown(ack)) => {
                    if let Some(items) = pending.take() {
                        write_snapshot(&store, items, &writes).await;
                    }
                    let _ = ack.send(());
                    return;
                }
                None => {
                    if let Some(items) = pending.take() {
                        write_snapshot(&store, items, &writes).await;
                    }
                    return;
                }
            },
            _ = tokio::time::sleep_until(deadline), if pending.is_some() => {
                if let Some(items) = pending.take() {
                    write_snapshot(&store, items, &writes).await;
                }
            }
        }
    }
}

async fn write_snapshot(store: &KvStore, items: Vec<DownloadItem>, writes: &AtomicU64) {
    let snap = Snapshot {
        version: SCHEMA_VERSION,
        items,
    };
    let bytes = match serde_json::to_vec(&snap) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("item snapshot not serializable: {e}");
            return;
        }
    };
    match store.put(ITEMS_KEY, &bytes).await {
        Ok(()) => {
            writes.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(items = snap.items.len(), "item snapshot persisted");
        }
        Err(e) => tracing::warn!("item snapshot write failed: {e:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{DownloadRequest, ItemStatus};
    use std::path::PathBuf;

    fn items(n: usize) -> Vec<DownloadItem> {
        (0..n)
            .map(|i| {
                DownloadItem::from_request(DownloadRequest {
                    id: format!("item-{i}"),
                    source_url: format!("https://example.com/{i}"),
                    destination_path: PathBuf::from(format!("/tmp/item-{i}")),
                    display_title: format!("item {i}"),
                    group: None,
                    size_hint: None,
                })
            })
            .collect()
    }

    #[tokio::test]
    async fn rapid_saves_coalesce_into_one_write() {
        let store = KvStore::open_memory().await.unwrap();
        let gateway = PersistenceGateway::new(store, Duration::from_millis(100));

        gateway.schedule_save(items(1));
        gateway.schedule_save(items(2));
        gateway.schedule_save(items(3));
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(gateway.durable_writes(), 1);
        let loaded = gateway.load().await;
        assert_eq!(loaded.len(), 3, "the latest snapshot wins");
    }

    #[tokio::test]
    async fn saves_in_separate_windows_write_separately() {
        let store = KvStore::open_memory().await.unwrap();
        let gateway = PersistenceGateway::new(store, Duration::from_millis(50));

        gateway.schedule_save(items(1));
        tokio::time::sleep(Duration::from_millis(200)).await;
        gateway.schedule_save(items(2));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(gateway.durable_writes(), 2);
        assert_eq!(gateway.load().await.len(), 2);
    }

    #[tokio::test]
    async fn flush_writes_pending_snapshot_immediately() {
        let store = KvStore::open_memory().await.unwrap();
        let gateway = PersistenceGateway::new(store, Duration::from_secs(60));

        gateway.schedule_save(items(2));
        gateway.flush().await;

        assert_eq!(gateway.durable_writes(), 1);
        assert_eq!(gateway.load().await.len(), 2);
    }

    #[tokio::test]
    async fn shutdown_flushes_and_stops_the_timer() {
        let store = KvStore::open_memory().await.unwrap();
        let gateway = PersistenceGateway::new(store, Duration::from_secs(60));

        gateway.schedule_save(items(1));
        gateway.shutdown().await;
        assert_eq!(gateway.durable_writes(), 1);
        assert_eq!(gateway.load().await.len(), 1);

        // Saves after teardown are dropped, not written.
        gateway.schedule_save(items(5));
        gateway.flush().await;
        assert_eq!(gateway.durable_writes(), 1);
    }

    #[tokio::test]
    async fn load_rejects_unknown_schema_version() {
        let store = KvStore::open_memory().await.unwrap();
        store
            .put(ITEMS_KEY, br#"{"version":99,"items":[{"bogus":true}]}"#)
            .await
            .unwrap();
        let gateway = PersistenceGateway::new(store, Duration::from_millis(10));
        assert!(gateway.load().await.is_empty());
    }

    #[tokio::test]
    async fn load_missing_or_garbage_starts_empty() {
        let store = KvStore::open_memory().await.unwrap();
        let gateway = PersistenceGateway::new(store.clone(), Duration::from_millis(10));
        assert!(gateway.load().await.is_empty());

        store.put(ITEMS_KEY, b"not json").await.unwrap();
        assert!(gateway.load().await.is_empty());
    }

    #[tokio::test]
    async fn snapshot_preserves_status_fields() {
        let store = KvStore::open_memory().await.unwrap();
        let gateway = PersistenceGateway::new(store, Duration::from_millis(10));

        let mut set = items(1);
        set[0].status = ItemStatus::Failed { error: "HTTP 503".into() };
        set[0].progress = 0.4;
        gateway.schedule_save(set);
        gateway.flush().await;

        let loaded = gateway.load().await;
        assert_eq!(loaded[0].status, ItemStatus::Failed { error: "HTTP 503".into() });
        assert!((loaded[0].progress - 0.4).abs() < 1e-9);
    }
}
