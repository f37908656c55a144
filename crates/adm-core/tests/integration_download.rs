//! Integration: local HTTP server, real curl transport, full scheduler flow.
//!
//! Starts a minimal server, enqueues downloads, runs them through the
//! scheduler, and checks file contents, item state, and persistence.

mod common;

use std::sync::Arc;
use std::time::Duration;

use adm_core::cache::CacheConfig;
use adm_core::item::{DownloadRequest, ItemStatus};
use adm_core::persist::PersistenceGateway;
use adm_core::probe::MetaCache;
use adm_core::scheduler::{Scheduler, SchedulerOptions};
use adm_core::sideeffect::SideEffects;
use adm_core::store::KvStore;
use adm_core::transfer::{HttpTransport, Transport};
use tempfile::tempdir;

const BODY_LEN: usize = 64 * 1024;

fn test_body() -> Vec<u8> {
    (0u8..=255).cycle().take(BODY_LEN).collect()
}

async fn scheduler_over(store: KvStore) -> (Scheduler, Arc<PersistenceGateway>) {
    let gateway = Arc::new(PersistenceGateway::new(store, Duration::from_millis(50)));
    let scheduler = Scheduler::new(
        Arc::new(HttpTransport::default()) as Arc<dyn Transport>,
        Arc::clone(&gateway),
        SideEffects::default(),
        SchedulerOptions::default(),
        Vec::new(),
    );
    (scheduler, gateway)
}

fn request(base: &str, name: &str, dir: &std::path::Path) -> DownloadRequest {
    DownloadRequest {
        id: name.to_string(),
        source_url: format!("{base}{name}"),
        destination_path: dir.join(name),
        display_title: name.to_string(),
        group: None,
        size_hint: None,
    }
}

#[tokio::test]
async fn download_completes_and_file_matches() {
    let body = test_body();
    let base = common::http_server::start(body.clone());
    let download_dir = tempdir().unwrap();

    let store = KvStore::open_memory().await.unwrap();
    let (scheduler, gateway) = scheduler_over(store).await;

    scheduler
        .enqueue(request(&base, "asset.bin", download_dir.path()))
        .unwrap();
    scheduler.wait_idle().await;

    let view = scheduler.view();
    let item = view.by_id("asset.bin").expect("item tracked");
    assert_eq!(item.status, ItemStatus::Completed);
    assert_eq!(item.size_bytes, body.len() as u64);
    assert_eq!(item.progress, 1.0);
    assert_eq!(view.total_bytes_used(), body.len() as u64);

    let content = std::fs::read(download_dir.path().join("asset.bin")).unwrap();
    assert_eq!(content.len(), body.len(), "file size must match");
    assert_eq!(content, body, "file content must match");

    // The final snapshot reached durable storage.
    scheduler.shutdown().await;
    let loaded = gateway.load().await;
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].status, ItemStatus::Completed);
}

#[tokio::test]
async fn missing_asset_fails_and_stays_visible() {
    let base = common::http_server::start(test_body());
    let download_dir = tempdir().unwrap();

    let store = KvStore::open_memory().await.unwrap();
    let (scheduler, _gateway) = scheduler_over(store).await;

    scheduler
        .enqueue(request(&base, "missing", download_dir.path()))
        .unwrap();
    scheduler.wait_idle().await;

    let view = scheduler.view();
    let item = view.by_id("missing").expect("failed item retained");
    match &item.status {
        ItemStatus::Failed { error } => assert!(error.contains("404"), "{error}"),
        other => panic!("expected failed, got {other:?}"),
    }
    assert!(!download_dir.path().join("missing").exists());
    scheduler.shutdown().await;
}

#[tokio::test]
async fn two_of_three_run_concurrently_and_all_complete() {
    let body = test_body();
    let base = common::http_server::start(body.clone());
    let download_dir = tempdir().unwrap();

    let store = KvStore::open_memory().await.unwrap();
    let (scheduler, _gateway) = scheduler_over(store).await;

    for name in ["a.bin", "b.bin", "c.bin"] {
        scheduler
            .enqueue(request(&base, name, download_dir.path()))
            .unwrap();
    }
    assert!(scheduler.view().active().len() <= 2);
    scheduler.wait_idle().await;

    let view = scheduler.view();
    assert_eq!(view.completed().len(), 3);
    assert_eq!(view.total_bytes_used(), 3 * body.len() as u64);
    for name in ["a.bin", "b.bin", "c.bin"] {
        assert_eq!(std::fs::read(download_dir.path().join(name)).unwrap(), body);
    }
    scheduler.shutdown().await;
}

#[tokio::test]
async fn head_probe_flows_through_the_cache() {
    let base = common::http_server::start(test_body());
    let store = KvStore::open_memory().await.unwrap();
    let cache = MetaCache::new(store.clone(), CacheConfig::default());

    let url = format!("{base}asset.bin");
    let meta = cache.lookup(&url).await.unwrap();
    assert_eq!(meta.content_length, Some(BODY_LEN as u64));
    assert_eq!(meta.content_type.as_deref(), Some("application/octet-stream"));

    // Second lookup is answered by the cache (identical result), and a fresh
    // cache over the same store is answered by the durable tier.
    assert_eq!(cache.lookup(&url).await.unwrap(), meta);
    let rebuilt = MetaCache::new(store, CacheConfig::default());
    assert_eq!(rebuilt.lookup(&url).await.unwrap(), meta);
}
