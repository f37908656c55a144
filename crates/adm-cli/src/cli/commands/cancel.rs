//! `adm cancel <id>` – cancel a queued or running download.
//!
//! Signals an active `adm run` best-effort, then drops the item from the
//! snapshot and deletes partial output.

use anyhow::Result;
use std::path::Path;

use adm_core::config::AdmConfig;
use adm_core::diskfile;
use adm_core::store::KvStore;

use crate::cli::control_socket;

pub async fn run_cancel(store: &KvStore, cfg: &AdmConfig, id: &str) -> Result<()> {
    if let Ok(path) = adm_core::control::default_control_socket_path() {
        let _ = control_socket::send_command(&path, "cancel", id).await;
    }

    let gateway = super::gateway(store, cfg);
    let mut items = gateway.load().await;
    let Some(pos) = items.iter().position(|i| i.id == id) else {
        anyhow::bail!("no download with id '{id}'");
    };
    if items[pos].status.is_terminal() {
        anyhow::bail!(
            "download '{id}' is already {}; use `adm remove`",
            items[pos].status.label()
        );
    }

    let item = items.remove(pos);
    delete_partial(&item.destination_path);
    gateway.schedule_save(items);
    gateway.shutdown().await;
    println!("Cancelled '{id}'");
    Ok(())
}

fn delete_partial(dest: &Path) {
    let part = diskfile::part_path(dest);
    match diskfile::remove_if_exists(&part) {
        Ok(true) => tracing::debug!(path = %part.display(), "deleted partial output"),
        Ok(false) => {}
        Err(e) => tracing::warn!(path = %part.display(), "could not delete partial output: {e}"),
    }
}
