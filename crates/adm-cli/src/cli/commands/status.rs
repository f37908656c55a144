//! `adm status` – show status of all downloads.

use anyhow::Result;

use adm_core::config::AdmConfig;
use adm_core::store::KvStore;
use adm_core::view::DownloadsView;

pub async fn run_status(store: &KvStore, cfg: &AdmConfig) -> Result<()> {
    let gateway = super::gateway(store, cfg);
    let items = gateway.load().await;
    gateway.shutdown().await;

    let view = DownloadsView::new(items);
    if view.all().is_empty() {
        println!("No downloads tracked.");
        return Ok(());
    }

    println!("{:<32} {:<12} {:>12} {:>5}  {}", "ID", "STATE", "SIZE", "PCT", "URL");
    for item in view.all() {
        let size = if item.size_bytes > 0 {
            item.size_bytes.to_string()
        } else {
            "-".to_string()
        };
        println!(
            "{:<32} {:<12} {:>12} {:>4.0}%  {}",
            item.id,
            item.status.label(),
            size,
            item.progress * 100.0,
            item.source_url
        );
    }
    println!(
        "{} download(s), {} bytes completed",
        view.all().len(),
        view.total_bytes_used()
    );
    Ok(())
}
