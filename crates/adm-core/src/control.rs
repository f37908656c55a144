//! Per-transfer pause/abort signals.
//!
//! The scheduler registers a signal per active transfer and flips it on
//! pause/resume/cancel; the executor's sink observes it cooperatively between
//! chunks. Signals are advisory: the scheduler updates item status first and
//! the executor catches up when it next checks.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, RwLock};

#[derive(Debug, Default)]
struct SignalState {
    paused: bool,
    aborted: bool,
}

/// Pause/abort flags for one transfer, shared between the scheduler and the
/// executor's blocking sink.
#[derive(Debug, Default)]
pub struct TransferSignal {
    state: Mutex<SignalState>,
    cond: Condvar,
}

impl TransferSignal {
    pub fn pause(&self) {
        self.state.lock().unwrap().paused = true;
        self.cond.notify_all();
    }

    pub fn resume(&self) {
        self.state.lock().unwrap().paused = false;
        self.cond.notify_all();
    }

    pub fn abort(&self) {
        self.state.lock().unwrap().aborted = true;
        self.cond.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.state.lock().unwrap().aborted
    }

    /// Block while paused. Returns false once abort has been requested,
    /// true when the transfer may continue. Called between chunks.
    pub fn wait_while_paused(&self) -> bool {
        let mut st = self.state.lock().unwrap();
        while st.paused && !st.aborted {
            st = self.cond.wait(st).unwrap();
        }
        !st.aborted
    }
}

/// Registry of item id → transfer signal for the currently active transfers.
#[derive(Default)]
pub struct TransferControl {
    signals: RwLock<HashMap<String, Arc<TransferSignal>>>,
}

impl TransferControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a starting transfer; returns the signal to hand its executor.
    pub fn register(&self, id: &str) -> Arc<TransferSignal> {
        let signal = Arc::new(TransferSignal::default());
        self.signals
            .write()
            .unwrap()
            .insert(id.to_string(), Arc::clone(&signal));
        signal
    }

    /// Drop a finished transfer's signal. The executor keeps its own Arc.
    pub fn unregister(&self, id: &str) {
        self.signals.write().unwrap().remove(id);
    }

    pub fn pause(&self, id: &str) {
        if let Some(signal) = self.signals.read().unwrap().get(id) {
            signal.pause();
        }
    }

    pub fn resume(&self, id: &str) {
        if let Some(signal) = self.signals.read().unwrap().get(id) {
            signal.resume();
        }
    }

    pub fn abort(&self, id: &str) {
        if let Some(signal) = self.signals.read().unwrap().get(id) {
            signal.abort();
        }
    }
}

/// Default path for the control socket (same XDG state dir as the store).
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("adm")?.get_state_home();
    Ok(dir.join("control.sock"))
}
