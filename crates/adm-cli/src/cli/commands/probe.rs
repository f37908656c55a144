//! `adm probe <url>` – show remote asset metadata, cached per URL.

use anyhow::Result;

use adm_core::config::AdmConfig;
use adm_core::namehint;
use adm_core::probe::MetaCache;
use adm_core::store::KvStore;

pub async fn run_probe(store: &KvStore, cfg: &AdmConfig, url: &str, refresh: bool) -> Result<()> {
    let cache = MetaCache::new(store.clone(), super::cache_config(cfg));
    if refresh {
        cache.invalidate(url).await;
    }
    let meta = cache.lookup(url).await?;

    match meta.content_length {
        Some(size) => println!("Size: {size} bytes"),
        None => println!("Size: unknown"),
    }
    if let Some(content_type) = &meta.content_type {
        println!("Type: {content_type}");
    }
    println!(
        "Filename: {}",
        namehint::derive_filename(url, meta.content_disposition.as_deref())
    );
    Ok(())
}
