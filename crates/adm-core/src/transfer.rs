//! One network transfer per active item.
//!
//! The `Transport` port performs the blocking fetch (curl, like the HEAD
//! probe) and pushes bytes into a `TransferSink`; the executor's sink writes
//! them to the `.part` file, honors pause/abort signals between chunks, and
//! reports progress plus exactly one terminal event to the scheduler.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::control::TransferSignal;
use crate::diskfile::PartFile;
use crate::item::ItemId;

/// Error from a single transfer attempt. Terminal: the scheduler marks the
/// item failed and does not retry (a retry is a fresh enqueue).
#[derive(Debug)]
pub enum TransferError {
    /// Curl reported an error (timeout, connection, TLS, etc.).
    Curl(curl::Error),
    /// HTTP response had a non-2xx status.
    Http(u32),
    /// Disk write failed (e.g. disk full, permission denied).
    Storage(io::Error),
    /// The transfer was told to stop and complied.
    Aborted,
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Curl(e) => write!(f, "{}", e),
            TransferError::Http(code) => write!(f, "HTTP {}", code),
            TransferError::Storage(e) => write!(f, "storage: {}", e),
            TransferError::Aborted => write!(f, "transfer aborted"),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::Curl(e) => Some(e),
            TransferError::Storage(e) => Some(e),
            TransferError::Http(_) | TransferError::Aborted => None,
        }
    }
}

/// Receives the bytes of one transfer in order.
pub trait TransferSink {
    /// Total size when known (Content-Length). Called at most once, before
    /// the first chunk.
    fn total(&mut self, bytes: u64);
    /// Deliver the next chunk. Returning false asks the transport to stop.
    fn chunk(&mut self, data: &[u8]) -> bool;
}

/// Network transport port. Blocking; the executor calls it from
/// `spawn_blocking`. Returns the number of bytes delivered to the sink.
pub trait Transport: Send + Sync {
    fn fetch(&self, url: &str, sink: &mut dyn TransferSink) -> Result<u64, TransferError>;
}

/// HTTP(S) transport over curl.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpTransport {
    /// Optional receive-rate cap in bytes per second.
    pub max_recv_speed: Option<u64>,
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str, sink: &mut dyn TransferSink) -> Result<u64, TransferError> {
        let mut easy = curl::easy::Easy::new();
        easy.url(url).map_err(TransferError::Curl)?;
        easy.follow_location(true).map_err(TransferError::Curl)?;
        easy.max_redirections(10).map_err(TransferError::Curl)?;
        easy.connect_timeout(Duration::from_secs(30))
            .map_err(TransferError::Curl)?;
        easy.low_speed_limit(1024).map_err(TransferError::Curl)?;
        easy.low_speed_time(Duration::from_secs(60))
            .map_err(TransferError::Curl)?;
        easy.timeout(Duration::from_secs(3600))
            .map_err(TransferError::Curl)?;
        if let Some(speed) = self.max_recv_speed {
            easy.max_recv_speed(speed).map_err(TransferError::Curl)?;
        }

        // Content-Length of the final hop; redirect hops reset it.
        let content_length: Cell<Option<u64>> = Cell::new(None);
        let announced = Cell::new(false);
        let stopped = Cell::new(false);
        let delivered = Cell::new(0u64);
        let sink = RefCell::new(sink);

        {
            let mut transfer = easy.transfer();
            transfer
                .header_function(|data| {
                    if let Ok(line) = str::from_utf8(data) {
                        let line = line.trim_end();
                        if line.starts_with("HTTP/") {
                            content_length.set(None);
                        } else if let Some((name, value)) = line.split_once(':') {
                            if name.eq_ignore_ascii_case("content-length") {
                                content_length.set(value.trim().parse().ok());
                            }
                        }
                    }
                    true
                })
                .map_err(TransferError::Curl)?;
            transfer
                .write_function(|data| {
                    let mut sink = sink.borrow_mut();
                    if !announced.get() {
                        announced.set(true);
                        if let Some(total) = content_length.get() {
                            sink.total(total);
                        }
                    }
                    if sink.chunk(data) {
                        delivered.set(delivered.get() + data.len() as u64);
                        Ok(data.len())
                    } else {
                        stopped.set(true);
                        Ok(0) // abort transfer
                    }
                })
                .map_err(TransferError::Curl)?;
            if let Err(e) = transfer.perform() {
                if stopped.get() {
                    return Err(TransferError::Aborted);
                }
                return Err(TransferError::Curl(e));
            }
        }

        let code = easy.response_code().map_err(TransferError::Curl)?;
        if !(200..300).contains(&code) {
            return Err(TransferError::Http(code));
        }
        Ok(delivered.get())
    }
}

/// Event sent from an executor to the scheduler's event loop.
#[derive(Debug)]
pub enum TransferEvent {
    /// Bytes landed; `bytes_done` is monotonically non-decreasing.
    Progress {
        id: ItemId,
        bytes_done: u64,
        total_bytes: Option<u64>,
    },
    /// Exactly one per executor, after which it is gone.
    Finished {
        id: ItemId,
        result: Result<u64, TransferError>,
    },
}

/// What an executor needs to run one item's transfer.
#[derive(Debug, Clone)]
pub(crate) struct ExecutorSpec {
    pub id: ItemId,
    pub url: String,
    pub dest: PathBuf,
}

/// Sink that writes chunks to the `.part` file and reports progress.
struct DiskSink {
    id: ItemId,
    part: PartFile,
    signal: Arc<TransferSignal>,
    events: mpsc::Sender<TransferEvent>,
    total: Option<u64>,
    failed: Option<TransferError>,
}

impl DiskSink {
    fn emit_progress(&self) {
        // Progress is advisory; a full channel just drops the update.
        let _ = self.events.try_send(TransferEvent::Progress {
            id: self.id.clone(),
            bytes_done: self.part.written(),
            total_bytes: self.total,
        });
    }
}

impl TransferSink for DiskSink {
    fn total(&mut self, bytes: u64) {
        self.total = Some(bytes);
        if let Err(e) = self.part.preallocate(bytes) {
            tracing::debug!(id = %self.id, "preallocate failed: {e}");
        }
        self.emit_progress();
    }

    fn chunk(&mut self, data: &[u8]) -> bool {
        // Pause blocks here; abort (also while paused) stops the transfer.
        if !self.signal.wait_while_paused() {
            return false;
        }
        if let Err(e) = self.part.write_chunk(data) {
            self.failed = Some(TransferError::Storage(e));
            return false;
        }
        self.emit_progress();
        true
    }
}

/// Runs one transfer to completion and sends exactly one `Finished` event.
/// Spawned by the scheduler per admitted item.
pub(crate) async fn run_transfer(
    spec: ExecutorSpec,
    transport: Arc<dyn Transport>,
    signal: Arc<TransferSignal>,
    events: mpsc::Sender<TransferEvent>,
) {
    let id = spec.id.clone();
    let blocking_events = events.clone();
    let join = tokio::task::spawn_blocking(move || {
        transfer_blocking(spec, transport.as_ref(), &signal, blocking_events)
    })
    .await;
    let result = match join {
        Ok(r) => r,
        Err(e) => Err(TransferError::Storage(io::Error::new(
            io::ErrorKind::Other,
            format!("transfer task join: {e}"),
        ))),
    };
    let _ = events.send(TransferEvent::Finished { id, result }).await;
}

fn transfer_blocking(
    spec: ExecutorSpec,
    transport: &dyn Transport,
    signal: &Arc<TransferSignal>,
    events: mpsc::Sender<TransferEvent>,
) -> Result<u64, TransferError> {
    let part = PartFile::create(&spec.dest).map_err(TransferError::Storage)?;
    let mut sink = DiskSink {
        id: spec.id,
        part,
        signal: Arc::clone(signal),
        events,
        total: None,
        failed: None,
    };

    let fetched = transport.fetch(&spec.url, &mut sink);
    let DiskSink { part, failed, .. } = sink;

    // The sink's own failure is the real cause when it stopped the transport.
    if let Some(storage_err) = failed {
        return Err(storage_err);
    }

    match fetched {
        Ok(bytes) => {
            // A transfer that was cancelled while finishing must discard its
            // result rather than report completion.
            if signal.is_aborted() {
                part.discard();
                return Err(TransferError::Aborted);
            }
            part.finalize().map_err(TransferError::Storage)?;
            Ok(bytes)
        }
        Err(TransferError::Aborted) => {
            part.discard();
            Err(TransferError::Aborted)
        }
        Err(e) => {
            // Keep the .part for inspection; `remove`/`cancel` clean it up.
            Err(e)
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport for scheduler and executor tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::mpsc as std_mpsc;
    use std::sync::Mutex;

    /// Scripted response for one URL.
    pub(crate) struct Script {
        pub chunks: Vec<Vec<u8>>,
        pub announce_total: bool,
        /// When set, the transfer blocks after its chunks until the test
        /// drops (or signals) the paired sender.
        pub hold: Option<std_mpsc::Receiver<()>>,
        pub result: Result<(), TransferError>,
    }

    impl Script {
        pub fn ok(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
                announce_total: true,
                hold: None,
                result: Ok(()),
            }
        }

        pub fn failing(chunks: &[&[u8]], err: TransferError) -> Self {
            Self {
                result: Err(err),
                ..Self::ok(chunks)
            }
        }

        /// Transfer that stays open until the returned sender is dropped.
        pub fn held(chunks: &[&[u8]]) -> (Self, std_mpsc::Sender<()>) {
            let (tx, rx) = std_mpsc::channel();
            let script = Self {
                hold: Some(rx),
                ..Self::ok(chunks)
            };
            (script, tx)
        }
    }

    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        scripts: Mutex<HashMap<String, Script>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn script(&self, url: &str, script: Script) {
            self.scripts.lock().unwrap().insert(url.to_string(), script);
        }
    }

    impl Transport for ScriptedTransport {
        fn fetch(&self, url: &str, sink: &mut dyn TransferSink) -> Result<u64, TransferError> {
            let script = self
                .scripts
                .lock()
                .unwrap()
                .remove(url)
                .unwrap_or_else(|| panic!("no script for {url}"));

            let total: u64 = script.chunks.iter().map(|c| c.len() as u64).sum();
            if script.announce_total {
                sink.total(total);
            }
            let mut delivered = 0u64;
            for chunk in &script.chunks {
                if !sink.chunk(chunk) {
                    return Err(TransferError::Aborted);
                }
                delivered += chunk.len() as u64;
            }
            if let Some(hold) = script.hold {
                let _ = hold.recv();
            }
            script.result.map(|()| delivered)
        }
    }
}
