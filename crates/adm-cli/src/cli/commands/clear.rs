//! `adm clear` – drop every tracked download and delete its files.

use anyhow::Result;

use adm_core::config::AdmConfig;
use adm_core::diskfile;
use adm_core::store::KvStore;

pub async fn run_clear(store: &KvStore, cfg: &AdmConfig) -> Result<()> {
    let gateway = super::gateway(store, cfg);
    let items = gateway.load().await;
    let count = items.len();
    for item in &items {
        for path in [
            item.destination_path.clone(),
            diskfile::part_path(&item.destination_path),
        ] {
            if let Err(e) = diskfile::remove_if_exists(&path) {
                tracing::warn!(path = %path.display(), "could not delete file: {e}");
            }
        }
    }
    gateway.schedule_save(Vec::new());
    gateway.shutdown().await;
    println!("Cleared {count} download(s)");
    Ok(())
}
