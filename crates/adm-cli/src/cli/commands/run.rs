//! `adm run` – process queued downloads until the queue drains.

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;

use adm_core::config::AdmConfig;
use adm_core::item::ItemStatus;
use adm_core::scheduler::{ItemProgress, Scheduler, SchedulerOptions};
use adm_core::sideeffect::{AllowExport, DirExport, LogNotifier, SideEffects};
use adm_core::store::KvStore;
use adm_core::transfer::{HttpTransport, Transport};

use crate::cli::control_socket;

pub async fn run_scheduler(store: &KvStore, cfg: &AdmConfig, jobs: Option<usize>) -> Result<()> {
    let gateway = Arc::new(super::gateway(store, cfg));
    let items = gateway.load().await;
    let runnable = items
        .iter()
        .filter(|i| matches!(i.status, ItemStatus::Pending | ItemStatus::Downloading))
        .count();
    if runnable == 0 {
        println!("Nothing queued.");
        gateway.shutdown().await;
        return Ok(());
    }

    let transport = Arc::new(HttpTransport {
        max_recv_speed: cfg.max_recv_speed,
    }) as Arc<dyn Transport>;
    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel::<ItemProgress>(16);
    let scheduler = Scheduler::new(
        transport,
        Arc::clone(&gateway),
        build_effects(cfg),
        SchedulerOptions {
            max_concurrent: jobs.unwrap_or(cfg.max_concurrent).max(1),
            progress: Some(progress_tx),
        },
        items,
    );

    // Remote pause/resume/cancel while this run is active.
    let socket_path = adm_core::control::default_control_socket_path().ok();
    if let Some(path) = &socket_path {
        if control_socket::spawn_control_listener(scheduler.clone(), path).is_ok() {
            tracing::debug!(path = %path.display(), "control socket listening");
        }
    }

    const PROGRESS_INTERVAL_MS: u128 = 500;
    let progress_handle = tokio::spawn(async move {
        let mut last_print = Instant::now();
        while let Some(p) = progress_rx.recv().await {
            let done = p.total_bytes > 0 && p.bytes_done >= p.total_bytes;
            if last_print.elapsed().as_millis() >= PROGRESS_INTERVAL_MS || done {
                let done_mib = p.bytes_done as f64 / 1_048_576.0;
                let total_mib = p.total_bytes as f64 / 1_048_576.0;
                println!(
                    "{}: {:.1}/{:.1} MiB ({:.0}%)",
                    p.display_title,
                    done_mib,
                    total_mib,
                    p.fraction() * 100.0
                );
                last_print = Instant::now();
            }
        }
    });

    println!("Running {} download(s)...", runnable);
    scheduler.start();
    scheduler.wait_idle().await;

    let view = scheduler.view();
    let completed = view.completed().len();
    let failed = view.failed().len();
    for item in view.failed() {
        if let ItemStatus::Failed { error } = &item.status {
            println!("failed: {} ({})", item.id, error);
        }
    }
    println!("Done: {completed} completed, {failed} failed.");

    scheduler.shutdown().await;
    progress_handle.abort();
    if let Some(path) = &socket_path {
        let _ = std::fs::remove_file(path);
    }
    Ok(())
}

fn build_effects(cfg: &AdmConfig) -> SideEffects {
    match &cfg.export_dir {
        Some(dir) => SideEffects::new(
            Box::new(LogNotifier),
            Box::new(AllowExport),
            Some(Box::new(DirExport::new(dir.clone()))),
        ),
        None => SideEffects::default(),
    }
}
