//! `adm resume <id>` – resume a paused download.
//!
//! With an active `adm run`, the running scheduler is signalled. Otherwise a
//! paused item in the snapshot is requeued for the next run.

use anyhow::Result;

use adm_core::config::AdmConfig;
use adm_core::item::ItemStatus;
use adm_core::store::KvStore;

use crate::cli::control_socket;

pub async fn run_resume(store: &KvStore, cfg: &AdmConfig, id: &str) -> Result<()> {
    if let Ok(path) = adm_core::control::default_control_socket_path() {
        if let Ok(true) = control_socket::send_command(&path, "resume", id).await {
            println!("Resume requested for '{id}'");
            return Ok(());
        }
    }

    let gateway = super::gateway(store, cfg);
    let mut items = gateway.load().await;
    let Some(pos) = items.iter().position(|i| i.id == id) else {
        anyhow::bail!("no download with id '{id}'");
    };
    match items[pos].status.clone() {
        ItemStatus::Paused => {
            items[pos].status = ItemStatus::Pending;
            gateway.schedule_save(items);
            gateway.shutdown().await;
            println!("Requeued '{id}'; start it with `adm run`");
            Ok(())
        }
        other => anyhow::bail!(
            "operation not valid for download '{id}' while {}",
            other.label()
        ),
    }
}
