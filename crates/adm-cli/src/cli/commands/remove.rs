//! `adm remove <id>` – remove a finished download and delete its file.

use anyhow::Result;

use adm_core::config::AdmConfig;
use adm_core::diskfile;
use adm_core::store::KvStore;

pub async fn run_remove(store: &KvStore, cfg: &AdmConfig, id: &str) -> Result<()> {
    let gateway = super::gateway(store, cfg);
    let mut items = gateway.load().await;
    let Some(pos) = items.iter().position(|i| i.id == id) else {
        anyhow::bail!("no download with id '{id}'");
    };
    if !items[pos].status.is_terminal() {
        anyhow::bail!(
            "download '{id}' is still {}; cancel it instead",
            items[pos].status.label()
        );
    }

    let item = items.remove(pos);
    for path in [
        item.destination_path.clone(),
        diskfile::part_path(&item.destination_path),
    ] {
        match diskfile::remove_if_exists(&path) {
            Ok(true) => tracing::debug!(path = %path.display(), "deleted file"),
            Ok(false) => {}
            Err(e) => tracing::warn!(path = %path.display(), "could not delete file: {e}"),
        }
    }
    gateway.schedule_save(items);
    gateway.shutdown().await;
    println!("Removed '{id}'");
    Ok(())
}
