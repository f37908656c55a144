//! Control socket: server (during `adm run`) and client (for pause/resume/cancel).
//! Protocol: one line per command: "pause <id>", "resume <id>", or "cancel <id>".

use anyhow::Result;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixListener;

use adm_core::scheduler::Scheduler;

/// Spawns a task that listens on `path` and dispatches each command line to
/// the scheduler. Ignores malformed lines.
pub fn spawn_control_listener(
    scheduler: Scheduler,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    let handle = tokio::spawn(async move {
        let _ = std::fs::remove_file(&path);
        let listener = match UnixListener::bind(&path) {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(path = %path.display(), "control socket bind: {}", e);
                return;
            }
        };
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let scheduler = scheduler.clone();
                    tokio::spawn(async move {
                        let mut reader = BufReader::new(stream).lines();
                        while let Ok(Some(line)) = reader.next_line().await {
                            dispatch(&scheduler, line.trim());
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

fn dispatch(scheduler: &Scheduler, line: &str) {
    let Some((op, id)) = line.split_once(' ') else {
        return;
    };
    let id = id.trim();
    let result = match op {
        "pause" => scheduler.pause(id),
        "resume" => scheduler.resume(id),
        "cancel" => scheduler.cancel(id),
        _ => return,
    };
    if let Err(e) = result {
        tracing::warn!("control '{op} {id}': {e}");
    }
}

/// Sends "<op> <id>\n" to the control socket. Returns false when no socket
/// exists (no active run).
pub async fn send_command(socket_path: &Path, op: &str, id: &str) -> Result<bool> {
    if !socket_path.exists() {
        return Ok(false);
    }
    let mut stream = tokio::net::UnixStream::connect(socket_path).await?;
    let msg = format!("{op} {id}\n");
    tokio::io::AsyncWriteExt::write_all(&mut stream, msg.as_bytes()).await?;
    Ok(true)
}
