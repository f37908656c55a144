//! Best-effort side effects: notifications and permission-gated export.
//!
//! Invoked by the scheduler after a state transition has been applied.
//! Failures here are logged and never unwind into item state.

use std::io;
use std::path::PathBuf;

use crate::item::DownloadItem;

/// Lifecycle moments surfaced to the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadEvent {
    Started,
    Completed,
    Failed,
}

/// Notification port (desktop notifications, app badges, ...).
pub trait Notifier: Send + Sync {
    fn notify(&self, event: DownloadEvent, item: &DownloadItem) -> anyhow::Result<()>;
}

/// Default notifier: a log line per event.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: DownloadEvent, item: &DownloadItem) -> anyhow::Result<()> {
        match event {
            DownloadEvent::Started => tracing::info!(id = %item.id, "download started"),
            DownloadEvent::Completed => {
                tracing::info!(id = %item.id, bytes = item.size_bytes, "download completed")
            }
            DownloadEvent::Failed => tracing::info!(id = %item.id, "download failed"),
        }
        Ok(())
    }
}

/// Capability check consulted before exporting to shared storage.
pub trait PermissionGate: Send + Sync {
    fn may_export(&self) -> bool;
}

/// Gate that always declines; exports stay off without an explicit grant.
pub struct DenyExport;

impl PermissionGate for DenyExport {
    fn may_export(&self) -> bool {
        false
    }
}

/// Gate that always grants (configured export directory implies consent).
pub struct AllowExport;

impl PermissionGate for AllowExport {
    fn may_export(&self) -> bool {
        true
    }
}

/// Destination for exported copies of completed downloads.
pub trait ExportSink: Send + Sync {
    fn export(&self, item: &DownloadItem) -> io::Result<PathBuf>;
}

/// Copies the completed file into a shared directory.
pub struct DirExport {
    dir: PathBuf,
}

impl DirExport {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl ExportSink for DirExport {
    fn export(&self, item: &DownloadItem) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let name = item
            .destination_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| item.id.clone().into());
        let target = self.dir.join(name);
        std::fs::copy(&item.destination_path, &target)?;
        Ok(target)
    }
}

/// Bundle of side-effect ports the scheduler fires after transitions.
pub struct SideEffects {
    notifier: Box<dyn Notifier>,
    gate: Box<dyn PermissionGate>,
    export: Option<Box<dyn ExportSink>>,
}

impl Default for SideEffects {
    fn default() -> Self {
        Self {
            notifier: Box::new(LogNotifier),
            gate: Box::new(DenyExport),
            export: None,
        }
    }
}

impl SideEffects {
    pub fn new(
        notifier: Box<dyn Notifier>,
        gate: Box<dyn PermissionGate>,
        export: Option<Box<dyn ExportSink>>,
    ) -> Self {
        Self {
            notifier,
            gate,
            export,
        }
    }

    fn notify(&self, event: DownloadEvent, item: &DownloadItem) {
        if let Err(e) = self.notifier.notify(event, item) {
            tracing::warn!(id = %item.id, ?event, "notifier failed: {e:#}");
        }
    }

    pub(crate) fn started(&self, item: &DownloadItem) {
        self.notify(DownloadEvent::Started, item);
    }

    pub(crate) fn failed(&self, item: &DownloadItem) {
        self.notify(DownloadEvent::Failed, item);
    }

    /// Completion notification plus the gated export. A declined gate or a
    /// failed copy leaves the download completed in its private destination.
    pub(crate) fn completed(&self, item: &DownloadItem) {
        self.notify(DownloadEvent::Completed, item);
        let Some(export) = &self.export else {
            return;
        };
        if !self.gate.may_export() {
            tracing::debug!(id = %item.id, "export permission denied, keeping private copy only");
            return;
        }
        match export.export(item) {
            Ok(target) => tracing::info!(id = %item.id, target = %target.display(), "exported"),
            Err(e) => tracing::warn!(id = %item.id, "export failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{DownloadRequest, ItemStatus};
    use std::sync::Mutex;

    fn completed_item(dest: &std::path::Path) -> DownloadItem {
        let mut item = DownloadItem::from_request(DownloadRequest {
            id: "a.bin".into(),
            source_url: "https://example.com/a.bin".into(),
            destination_path: dest.to_path_buf(),
            display_title: "a".into(),
            group: None,
            size_hint: None,
        });
        item.status = ItemStatus::Completed;
        item.progress = 1.0;
        item
    }

    struct Recording(Mutex<Vec<DownloadEvent>>);

    impl Notifier for Recording {
        fn notify(&self, event: DownloadEvent, _item: &DownloadItem) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(event);
            Ok(())
        }
    }

    struct Exploding;

    impl Notifier for Exploding {
        fn notify(&self, _event: DownloadEvent, _item: &DownloadItem) -> anyhow::Result<()> {
            anyhow::bail!("notification daemon unreachable")
        }
    }

    #[test]
    fn notifier_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let effects = SideEffects::new(Box::new(Exploding), Box::new(DenyExport), None);
        // Must not panic or propagate.
        effects.completed(&completed_item(&dir.path().join("a.bin")));
    }

    #[test]
    fn denied_gate_skips_export() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.bin");
        std::fs::write(&src, b"data").unwrap();
        let shared = dir.path().join("shared");

        let effects = SideEffects::new(
            Box::new(LogNotifier),
            Box::new(DenyExport),
            Some(Box::new(DirExport::new(shared.clone()))),
        );
        effects.completed(&completed_item(&src));
        assert!(!shared.exists(), "no export without permission");
    }

    #[test]
    fn granted_gate_copies_into_export_dir() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.bin");
        std::fs::write(&src, b"data").unwrap();
        let shared = dir.path().join("shared");

        let effects = SideEffects::new(
            Box::new(LogNotifier),
            Box::new(AllowExport),
            Some(Box::new(DirExport::new(shared.clone()))),
        );
        effects.completed(&completed_item(&src));
        assert_eq!(std::fs::read(shared.join("a.bin")).unwrap(), b"data");
    }

    #[test]
    fn events_fire_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let recording = std::sync::Arc::new(Recording(Mutex::new(Vec::new())));
        struct Fwd(std::sync::Arc<Recording>);
        impl Notifier for Fwd {
            fn notify(&self, event: DownloadEvent, item: &DownloadItem) -> anyhow::Result<()> {
                self.0.notify(event, item)
            }
        }

        let effects = SideEffects::new(
            Box::new(Fwd(std::sync::Arc::clone(&recording))),
            Box::new(DenyExport),
            None,
        );
        let item = completed_item(&dir.path().join("a.bin"));
        effects.started(&item);
        effects.completed(&item);
        effects.failed(&item);
        assert_eq!(
            *recording.0.lock().unwrap(),
            vec![DownloadEvent::Started, DownloadEvent::Completed, DownloadEvent::Failed]
        );
    }
}
