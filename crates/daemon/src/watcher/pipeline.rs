// Auto-versioning pipeline: raw FS event → per-path debounce → read →
// create_version → retention prune → WatcherEvent.
//
// Create and modify events (re)start the path's timer. Remove events cancel
// it and never create versions.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use folio_common::path::workspace_key;
use folio_common::types::{FileVersion, VersionSource};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::debounce::{DebounceConfig, Debouncer};
use super::{FileWatcher, FsEventKind, RawFsEvent};
use crate::error::{IoContext, StoreResult};
use crate::store::versions::VersionStore;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notifications delivered to consumers of a running watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WatcherEvent {
    VersionCreated { file_path: String, version_id: String },
    VersionError { file_path: String, message: String },
}

/// Pruning applied after each auto-created version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Versions kept per file.
    pub max_versions: Option<usize>,
    /// Versions older than this are dropped across the workspace.
    pub retention_days: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct WatcherConfig {
    pub debounce: DebounceConfig,
    pub retention: RetentionPolicy,
    /// Directory names whose contents never produce events.
    pub excludes: Vec<String>,
}

/// Handle to a running auto-versioning watcher.
pub struct ChangeWatcher {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
    file_watcher: Option<FileWatcher>,
}

impl ChangeWatcher {
    /// Watch `root` recursively and version markdown files as they settle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        root: &Path,
        versions: Arc<VersionStore>,
        config: WatcherConfig,
    ) -> Result<(Self, mpsc::Receiver<WatcherEvent>)> {
        let (file_watcher, raw_rx) = FileWatcher::start(root, config.excludes.clone())?;
        let watch_root = file_watcher.root().to_path_buf();
        let (mut watcher, event_rx) = Self::from_events(watch_root, raw_rx, versions, config);
        watcher.file_watcher = Some(file_watcher);
        info!(path = %root.display(), "change watcher started");
        Ok((watcher, event_rx))
    }

    /// Drive the pipeline from an arbitrary raw event source. `root` must
    /// match the prefix of the incoming event paths.
    pub fn from_events(
        root: PathBuf,
        raw_rx: mpsc::Receiver<RawFsEvent>,
        versions: Arc<VersionStore>,
        config: WatcherConfig,
    ) -> (Self, mpsc::Receiver<WatcherEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let pipeline = run_pipeline(root, raw_rx, event_tx, versions, config, shutdown_rx);
        let task = tokio::spawn(pipeline);
        (Self { shutdown_tx, task, file_watcher: None }, event_rx)
    }

    /// Cancel pending timers and close the watch. A version being written
    /// when this is called is finished first.
    pub async fn stop(mut self) {
        self.file_watcher.take();
        let _ = self.shutdown_tx.send(());
        if let Err(error) = self.task.await {
            warn!(error = %error, "watcher pipeline task failed");
        }
        info!("change watcher stopped");
    }
}

async fn run_pipeline(
    root: PathBuf,
    mut raw_rx: mpsc::Receiver<RawFsEvent>,
    event_tx: mpsc::Sender<WatcherEvent>,
    versions: Arc<VersionStore>,
    config: WatcherConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut debouncer: Debouncer<String, PathBuf> = Debouncer::new(config.debounce);

    debug!(path = %root.display(), "watcher pipeline started");

    loop {
        let deadline = debouncer.next_deadline().map(tokio::time::Instant::from_std);

        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                let cancelled = debouncer.cancel_all();
                debug!(cancelled, "watcher pipeline shutting down");
                break;
            }

            maybe_event = raw_rx.recv() => {
                let Some(event) = maybe_event else {
                    debug!("raw event channel closed, pipeline exiting");
                    break;
                };
                schedule(&mut debouncer, &root, event);
            }

            _ = tokio::time::sleep_until(deadline.unwrap_or_else(tokio::time::Instant::now)),
                if deadline.is_some() => {}
        }

        for (key, path) in debouncer.drain_ready() {
            let Some(event) = version_file(&versions, key, path, config.retention).await else {
                continue;
            };
            if event_tx.send(event).await.is_err() {
                debug!("watcher event channel closed, pipeline exiting");
                return;
            }
        }
    }
}

fn schedule(debouncer: &mut Debouncer<String, PathBuf>, root: &Path, event: RawFsEvent) {
    let key = match workspace_key(root, &event.path) {
        Ok(key) => key,
        Err(error) => {
            warn!(path = %event.path.display(), error = %error, "ignoring event with invalid path");
            return;
        }
    };

    match event.kind {
        FsEventKind::Create | FsEventKind::Modify => {
            trace!(path = %key, kind = ?event.kind, "debouncing change");
            debouncer.push(key, event.path);
        }
        FsEventKind::Remove => {
            if debouncer.cancel(&key) {
                trace!(path = %key, "file removed, pending version cancelled");
            }
        }
    }
}

/// Version one settled file. `None` when the content was unchanged.
async fn version_file(
    versions: &Arc<VersionStore>,
    key: String,
    path: PathBuf,
    retention: RetentionPolicy,
) -> Option<WatcherEvent> {
    let store = Arc::clone(versions);
    let file_path = key.clone();
    let outcome =
        tokio::task::spawn_blocking(move || create_and_prune(&store, &key, &path, retention)).await;

    match outcome {
        Ok(Ok(Some(version))) => {
            debug!(path = %file_path, version_id = %version.id, "auto version created");
            Some(WatcherEvent::VersionCreated { file_path, version_id: version.id })
        }
        Ok(Ok(None)) => {
            trace!(path = %file_path, "no-op save");
            None
        }
        Ok(Err(error)) => {
            warn!(path = %file_path, error = %error, "auto version failed");
            Some(WatcherEvent::VersionError { file_path, message: error.to_string() })
        }
        Err(error) => {
            warn!(path = %file_path, error = %error, "auto version task failed");
            Some(WatcherEvent::VersionError { file_path, message: error.to_string() })
        }
    }
}

fn create_and_prune(
    versions: &VersionStore,
    key: &str,
    path: &Path,
    retention: RetentionPolicy,
) -> StoreResult<Option<FileVersion>> {
    let content = fs::read(path).at(path)?;
    let Some(version) = versions.create_version(key, &content, VersionSource::Auto)? else {
        return Ok(None);
    };

    if let Some(max) = retention.max_versions {
        match versions.prune_old_versions(key, max) {
            Ok(0) => {}
            Ok(pruned) => debug!(path = %key, pruned, "pruned old versions"),
            Err(error) => warn!(path = %key, error = %error, "version pruning failed"),
        }
    }
    if let Some(days) = retention.retention_days {
        match versions.prune_by_retention(days) {
            Ok(0) => {}
            Ok(pruned) => debug!(days, pruned, "pruned expired versions"),
            Err(error) => warn!(days, error = %error, "retention pruning failed"),
        }
    }

    Ok(Some(version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::content::ContentStore;
    use crate::store::records::MemoryRecordStore;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};
    use tokio::time::timeout;

    struct Harness {
        tmp: TempDir,
        versions: Arc<VersionStore>,
        raw_tx: mpsc::Sender<RawFsEvent>,
        events: mpsc::Receiver<WatcherEvent>,
        watcher: ChangeWatcher,
    }

    impl Harness {
        fn start(retention: RetentionPolicy) -> Self {
            let tmp = tempdir().unwrap();
            let content = ContentStore::open(tmp.path().join("objects")).unwrap();
            let records = Arc::new(MemoryRecordStore::new());
            let versions = Arc::new(VersionStore::open(records, content).unwrap());
            let (raw_tx, raw_rx) = mpsc::channel(64);
            let config = WatcherConfig {
                debounce: DebounceConfig::with_millis(50),
                retention,
                excludes: Vec::new(),
            };
            let (watcher, events) =
                ChangeWatcher::from_events(tmp.path().into(), raw_rx, versions.clone(), config);
            Self { tmp, versions, raw_tx, events, watcher }
        }

        async fn write(&self, name: &str, body: &str) {
            let path = self.tmp.path().join(name);
            fs::write(&path, body).unwrap();
            self.raw_tx.send(RawFsEvent { kind: FsEventKind::Modify, path }).await.unwrap();
        }

        async fn send(&self, kind: FsEventKind, name: &str) {
            let path = self.tmp.path().join(name);
            self.raw_tx.send(RawFsEvent { kind, path }).await.unwrap();
        }

        async fn next_event(&mut self) -> WatcherEvent {
            timeout(Duration::from_secs(5), self.events.recv())
                .await
                .expect("timed out waiting for watcher event")
                .expect("event channel closed")
        }

        async fn assert_quiet(&mut self) {
            assert!(
                timeout(Duration::from_millis(250), self.events.recv()).await.is_err(),
                "expected no watcher event"
            );
        }
    }

    // ── Versioning ───────────────────────────────────────────────────

    #[tokio::test]
    async fn settled_change_creates_auto_version() {
        let mut h = Harness::start(RetentionPolicy::default());
        h.write("notes.md", "# Notes\n").await;

        let WatcherEvent::VersionCreated { file_path, version_id } = h.next_event().await else {
            panic!("expected version-created");
        };
        assert_eq!(file_path, "notes.md");

        let version = h.versions.get_version("notes.md", &version_id).unwrap();
        assert_eq!(version.created_by, VersionSource::Auto);
        assert_eq!(h.versions.get_content("notes.md", &version_id).unwrap(), b"# Notes\n");
        h.watcher.stop().await;
    }

    #[tokio::test]
    async fn burst_of_edits_yields_one_version_of_final_content() {
        let mut h = Harness::start(RetentionPolicy::default());
        h.write("plan.md", "draft one").await;
        h.write("plan.md", "draft two").await;
        h.write("plan.md", "draft three").await;

        let WatcherEvent::VersionCreated { version_id, .. } = h.next_event().await else {
            panic!("expected version-created");
        };
        h.assert_quiet().await;

        assert_eq!(h.versions.list_versions("plan.md").unwrap().len(), 1);
        assert_eq!(h.versions.get_content("plan.md", &version_id).unwrap(), b"draft three");
        h.watcher.stop().await;
    }

    #[tokio::test]
    async fn unchanged_content_emits_nothing() {
        let mut h = Harness::start(RetentionPolicy::default());
        h.write("same.md", "stable").await;
        h.next_event().await;

        h.write("same.md", "stable").await;
        h.assert_quiet().await;
        assert_eq!(h.versions.latest("same.md").unwrap().unwrap().version_count, 1);
        h.watcher.stop().await;
    }

    #[tokio::test]
    async fn remove_cancels_pending_version() {
        let mut h = Harness::start(RetentionPolicy::default());
        h.write("gone.md", "short lived").await;
        h.send(FsEventKind::Remove, "gone.md").await;

        h.assert_quiet().await;
        assert!(h.versions.list_files().is_empty());
        h.watcher.stop().await;
    }

    #[tokio::test]
    async fn unreadable_file_reports_version_error() {
        let mut h = Harness::start(RetentionPolicy::default());
        h.send(FsEventKind::Create, "missing.md").await;

        match h.next_event().await {
            WatcherEvent::VersionError { file_path, message } => {
                assert_eq!(file_path, "missing.md");
                assert!(!message.is_empty());
            }
            other => panic!("expected version-error, got {other:?}"),
        }
        h.watcher.stop().await;
    }

    #[tokio::test]
    async fn events_outside_root_are_ignored() {
        let mut h = Harness::start(RetentionPolicy::default());
        h.raw_tx
            .send(RawFsEvent { kind: FsEventKind::Modify, path: PathBuf::from("/elsewhere/x.md") })
            .await
            .unwrap();
        h.assert_quiet().await;
        h.watcher.stop().await;
    }

    // ── Retention ────────────────────────────────────────────────────

    #[tokio::test]
    async fn max_versions_is_enforced_after_each_version() {
        let mut h = Harness::start(RetentionPolicy { max_versions: Some(2), retention_days: None });
        for body in ["v1", "v2", "v3", "v4"] {
            h.write("log.md", body).await;
            h.next_event().await;
        }

        let remaining = h.versions.list_versions("log.md").unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].number, 4);
        h.watcher.stop().await;
    }

    // ── stop ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn stop_cancels_pending_timers() {
        let h = Harness::start(RetentionPolicy::default());
        h.write("pending.md", "never versioned").await;
        tokio::task::yield_now().await;

        let versions = h.versions.clone();
        h.watcher.stop().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(versions.list_files().is_empty());
    }

    #[test]
    fn events_serialize_with_kebab_case_tags() {
        let created =
            WatcherEvent::VersionCreated { file_path: "a.md".into(), version_id: "v1".into() };
        let failed =
            WatcherEvent::VersionError { file_path: "a.md".into(), message: "boom".into() };

        assert_eq!(
            serde_json::to_value(&created).unwrap(),
            serde_json::json!({"type": "version-created", "file_path": "a.md", "version_id": "v1"})
        );
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({"type": "version-error", "file_path": "a.md", "message": "boom"})
        );
    }
}
