//! Download scheduler: admission control, FIFO queue, lifecycle state.
//!
//! Single writer of the authoritative item set. Control operations
//! (`enqueue`, `pause`, `resume`, `cancel`, `remove`) and executor events all
//! serialize on one mutex, so set membership and status transitions cannot
//! race. Executors run as independent tasks (one per active item) and report
//! back over a channel; they never mutate the set directly.

mod events;
mod progress;
mod state;


pub use progress::ItemProgress;

use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::control::TransferControl;
use crate::diskfile;
use crate::error::ControlError;
use crate::item::{DownloadItem, DownloadRequest, ItemStatus};
use crate::persist::PersistenceGateway;
use crate::sideeffect::SideEffects;
use crate::transfer::{run_transfer, ExecutorSpec, TransferEvent, Transport};
use crate::view::DownloadsView;

use state::SchedState;

/// Scheduler tuning.
pub struct SchedulerOptions {
    /// Transfers running at once; the rest wait in FIFO order.
    pub max_concurrent: usize,
    /// Optional channel receiving progress updates for display.
    pub progress: Option<mpsc::Sender<ItemProgress>>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            progress: None,
        }
    }
}

/// Handle to the download scheduler. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    state: Mutex<SchedState>,
    control: TransferControl,
    transport: Arc<dyn Transport>,
    gateway: Arc<PersistenceGateway>,
    effects: SideEffects,
    events_tx: mpsc::Sender<TransferEvent>,
    progress_tx: Option<mpsc::Sender<ItemProgress>>,
    idle: Notify,
    max_concurrent: usize,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Build a scheduler over `initial_items` (a loaded snapshot; empty for a
    /// fresh start) and spawn its event loop. Must run within a tokio
    /// runtime. Loaded pending items are admitted on `start`, not here.
    pub fn new(
        transport: Arc<dyn Transport>,
        gateway: Arc<PersistenceGateway>,
        effects: SideEffects,
        opts: SchedulerOptions,
        initial_items: Vec<DownloadItem>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        let mut st = SchedState::new();
        st.seed(initial_items);

        let inner = Arc::new(Inner {
            state: Mutex::new(st),
            control: TransferControl::new(),
            transport,
            gateway,
            effects,
            events_tx,
            progress_tx: opts.progress,
            idle: Notify::new(),
            max_concurrent: opts.max_concurrent.max(1),
            event_loop: Mutex::new(None),
        });

        let handle = tokio::spawn(events::run_event_loop(Arc::clone(&inner), events_rx));
        *inner.event_loop.lock().unwrap() = Some(handle);

        Scheduler { inner }
    }

    /// Admit queued items up to the concurrency bound. Call once after
    /// constructing from a loaded snapshot.
    pub fn start(&self) {
        let started = {
            let mut guard = self.inner.state.lock().unwrap();
            let st = &mut *guard;
            let started = self.inner.admit_locked(st);
            self.inner.persist_locked(st);
            started
        };
        self.inner.emit_started(&started);
    }

    /// Track a new download. Runs immediately when a slot is free, otherwise
    /// joins the queue tail. Returns once admitted or queued, never once the
    /// transfer finishes. A terminal item with the same id is replaced (that
    /// is the retry path); a live one is rejected.
    pub fn enqueue(&self, req: DownloadRequest) -> Result<(), ControlError> {
        let started = {
            let mut guard = self.inner.state.lock().unwrap();
            let st = &mut *guard;
            if st.is_live(&req.id) {
                return Err(ControlError::AlreadyInProgress(req.id));
            }
            let item = DownloadItem::from_request(req);
            st.queue.push_back(item.id.clone());
            st.items.insert(item.id.clone(), item);
            let started = self.inner.admit_locked(st);
            self.inner.persist_locked(st);
            started
        };
        self.inner.emit_started(&started);
        Ok(())
    }

    /// Pause an active download. The executor observes the signal
    /// cooperatively; the item keeps its slot.
    pub fn pause(&self, id: &str) -> Result<(), ControlError> {
        let mut guard = self.inner.state.lock().unwrap();
        let st = &mut *guard;
        let status = match st.items.get(id) {
            None => return Err(ControlError::NotFound(id.to_string())),
            Some(item) => item.status.clone(),
        };
        if !st.active.contains(id) || status != ItemStatus::Downloading {
            return Err(invalid(id, &status));
        }
        if let Some(item) = st.items.get_mut(id) {
            item.status = ItemStatus::Paused;
        }
        self.inner.control.pause(id);
        self.inner.persist_locked(st);
        Ok(())
    }

    /// Resume a paused download. With a live (in-process) transfer the
    /// executor is signalled to continue; a paused item restored from a
    /// previous process has no transfer left and is requeued instead.
    pub fn resume(&self, id: &str) -> Result<(), ControlError> {
        let started = {
            let mut guard = self.inner.state.lock().unwrap();
            let st = &mut *guard;
            let status = match st.items.get(id) {
                None => return Err(ControlError::NotFound(id.to_string())),
                Some(item) => item.status.clone(),
            };
            if status != ItemStatus::Paused {
                return Err(invalid(id, &status));
            }
            if st.active.contains(id) {
                if let Some(item) = st.items.get_mut(id) {
                    item.status = ItemStatus::Downloading;
                }
                self.inner.control.resume(id);
                self.inner.persist_locked(st);
                Vec::new()
            } else {
                if let Some(item) = st.items.get_mut(id) {
                    item.status = ItemStatus::Pending;
                }
                st.queue.push_back(id.to_string());
                let started = self.inner.admit_locked(st);
                self.inner.persist_locked(st);
                started
            }
        };
        self.inner.emit_started(&started);
        Ok(())
    }

    /// Cancel any non-terminal download: abort its executor or drop it from
    /// the queue, delete partial output, and remove it from the set. Frees a
    /// slot, so the next queued item is admitted within this call.
    pub fn cancel(&self, id: &str) -> Result<(), ControlError> {
        let (dest, started) = {
            let mut guard = self.inner.state.lock().unwrap();
            let st = &mut *guard;
            let (status, dest) = match st.items.get(id) {
                None => return Err(ControlError::NotFound(id.to_string())),
                Some(item) => (item.status.clone(), item.destination_path.clone()),
            };
            if status.is_terminal() {
                return Err(invalid(id, &status));
            }
            if st.active.remove(id) {
                self.inner.control.abort(id);
                self.inner.control.unregister(id);
            } else {
                st.queue.retain(|q| q != id);
            }
            st.items.remove(id);
            let started = self.inner.admit_locked(st);
            self.inner.persist_locked(st);
            self.inner.notify_if_idle_locked(st);
            (dest, started)
        };
        // The executor also discards on abort; this covers queued items with
        // leftovers from an earlier attempt.
        remove_quietly(&diskfile::part_path(&dest));
        self.inner.emit_started(&started);
        Ok(())
    }

    /// Remove a terminal (completed/failed) download and delete its stored
    /// file. Non-terminal items must be cancelled instead.
    pub fn remove(&self, id: &str) -> Result<(), ControlError> {
        let dest = {
            let mut guard = self.inner.state.lock().unwrap();
            let st = &mut *guard;
            let (status, dest) = match st.items.get(id) {
                None => return Err(ControlError::NotFound(id.to_string())),
                Some(item) => (item.status.clone(), item.destination_path.clone()),
            };
            if !status.is_terminal() {
                return Err(invalid(id, &status));
            }
            st.items.remove(id);
            self.inner.persist_locked(st);
            dest
        };
        remove_quietly(&dest);
        remove_quietly(&diskfile::part_path(&dest));
        Ok(())
    }

    /// Cancel everything live and remove everything terminal, deleting files.
    pub fn clear_all(&self) {
        let files = {
            let mut guard = self.inner.state.lock().unwrap();
            let st = &mut *guard;
            let mut files = Vec::new();
            for (id, item) in st.items.iter() {
                if st.active.contains(id) {
                    self.inner.control.abort(id);
                    self.inner.control.unregister(id);
                }
                files.push(item.destination_path.clone());
            }
            st.items.clear();
            st.queue.clear();
            st.active.clear();
            self.inner.persist_locked(st);
            self.inner.notify_if_idle_locked(st);
            files
        };
        for dest in files {
            remove_quietly(&dest);
            remove_quietly(&diskfile::part_path(&dest));
        }
    }

    /// Copy of the authoritative item set, oldest first.
    pub fn snapshot(&self) -> Vec<DownloadItem> {
        self.inner.state.lock().unwrap().snapshot()
    }

    /// Read-only projections over the current snapshot. Recomputed per call;
    /// holds no copy of its own beyond the snapshot it was built from.
    pub fn view(&self) -> DownloadsView {
        DownloadsView::new(self.snapshot())
    }

    /// True when no download is running or waiting.
    pub fn is_idle(&self) -> bool {
        let st = self.inner.state.lock().unwrap();
        st.active.is_empty() && st.queue.is_empty()
    }

    /// Wait until the queue and the active set are both empty.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Flush pending persistence and stop the gateway timer and event loop.
    /// Call on teardown, after `wait_idle` (or once running items are no
    /// longer wanted).
    pub async fn shutdown(&self) {
        self.inner.gateway.shutdown().await;
        let handle = self.inner.event_loop.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Inner {
    /// Fill free slots from the queue head. Returns the items started so the
    /// caller can fire side effects after releasing the lock.
    fn admit_locked(&self, st: &mut SchedState) -> Vec<DownloadItem> {
        let mut started = Vec::new();
        while let Some(item) = st.pop_admittable(self.max_concurrent) {
            let signal = self.control.register(&item.id);
            let spec = ExecutorSpec {
                id: item.id.clone(),
                url: item.source_url.clone(),
                dest: item.destination_path.clone(),
            };
            tokio::spawn(run_transfer(
                spec,
                Arc::clone(&self.transport),
                signal,
                self.events_tx.clone(),
            ));
            started.push(item);
        }
        started
    }

    fn persist_locked(&self, st: &SchedState) {
        self.gateway.schedule_save(st.snapshot());
    }

    fn notify_if_idle_locked(&self, st: &SchedState) {
        if st.active.is_empty() && st.queue.is_empty() {
            self.idle.notify_waiters();
        }
    }

    fn emit_started(&self, started: &[DownloadItem]) {
        for item in started {
            self.effects.started(item);
        }
    }
}

fn invalid(id: &str, status: &ItemStatus) -> ControlError {
    ControlError::InvalidTransition {
        id: id.to_string(),
        state: status.label().to_string(),
    }
}

fn remove_quietly(path: &std::path::Path) {
    if let Err(e) = diskfile::remove_if_exists(path) {
        tracing::warn!(path = %path.display(), "could not delete file: {e}");
    }
}
