//! `adm add <url>` – queue a new download.

use anyhow::Result;
use std::path::PathBuf;

use adm_core::config::AdmConfig;
use adm_core::item::{DownloadItem, DownloadRequest};
use adm_core::namehint;
use adm_core::probe::{AssetMeta, MetaCache};
use adm_core::store::KvStore;

use super::{cache_config, gateway};

pub async fn run_add(
    store: &KvStore,
    cfg: &AdmConfig,
    url: &str,
    title: Option<String>,
    group: Option<String>,
    dest_dir: Option<PathBuf>,
) -> Result<()> {
    // Probe metadata through the cache for filename/size hints. A probe
    // failure is not fatal; the transfer will learn the size itself.
    let meta_cache = MetaCache::new(store.clone(), cache_config(cfg));
    let meta = match meta_cache.lookup(url).await {
        Ok(meta) => meta,
        Err(e) => {
            tracing::warn!(url, "metadata probe failed: {e:#}");
            AssetMeta::default()
        }
    };

    let filename = namehint::derive_filename(url, meta.content_disposition.as_deref());
    let dir = match dest_dir.or_else(|| cfg.download_dir.clone()) {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    let gateway = gateway(store, cfg);
    let mut items = gateway.load().await;
    if items.iter().any(|i| i.id == filename && !i.status.is_terminal()) {
        anyhow::bail!("download '{}' is already queued or in progress", filename);
    }
    // A terminal record with the same id is replaced: retry path.
    items.retain(|i| i.id != filename);

    let item = DownloadItem::from_request(DownloadRequest {
        id: filename.clone(),
        source_url: url.to_string(),
        destination_path: dir.join(&filename),
        display_title: title.unwrap_or_else(|| filename.clone()),
        group,
        size_hint: meta.content_length,
    });
    items.push(item);
    gateway.schedule_save(items);
    gateway.shutdown().await;

    match meta.content_length {
        Some(size) => println!("Queued '{filename}' ({size} bytes); start with `adm run`"),
        None => println!("Queued '{filename}'; start with `adm run`"),
    }
    Ok(())
}
