// One opened workspace: its state directory layout, config and stores.
//
// <root>/.folio/
//   objects/sha256/..   blobs
//   records/..          version, index and snapshot records
//   workspace.toml

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use folio_common::anchor::{self, AnchorTarget, Resolution};
use folio_common::section::parser::parse_headings;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{workspace_config_path, WorkspaceConfig};
use crate::error::{IoContext, StoreResult};
use crate::git::probe::{GitProbe, NoVcs, VcsProbe};
use crate::index::walk::STATE_DIR;
use crate::index::Indexer;
use crate::security::{create_private_dir_all, resolve_within_root};
use crate::store::content::ContentStore;
use crate::store::records::{FsRecordStore, RecordStore};
use crate::store::snapshot::SnapshotStore;
use crate::store::versions::VersionStore;
use crate::watcher::pipeline::{ChangeWatcher, WatcherEvent};

/// Resolved paths for a workspace's engine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub records_dir: PathBuf,
    pub objects_dir: PathBuf,
    pub config_path: PathBuf,
}

impl WorkspacePaths {
    /// Canonicalize `root` and derive the state paths beneath it.
    pub fn resolve(root: &Path) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("failed to resolve workspace root `{}`", root.display()))?;
        let state_dir = root.join(STATE_DIR);
        Ok(Self {
            records_dir: state_dir.join("records"),
            objects_dir: state_dir.join("objects"),
            config_path: workspace_config_path(&root),
            state_dir,
            root,
        })
    }
}

pub struct Workspace {
    paths: WorkspacePaths,
    config: WorkspaceConfig,
    versions: Arc<VersionStore>,
    indexer: Indexer,
    snapshots: SnapshotStore,
}

impl Workspace {
    /// Open the workspace at `root`, creating its state directory on first use.
    pub fn open(root: &Path) -> Result<Self> {
        let paths = WorkspacePaths::resolve(root)?;
        let config = WorkspaceConfig::load(&paths.root)
            .with_context(|| format!("failed to load `{}`", paths.config_path.display()))?;
        Self::open_with_config(paths, config)
    }

    pub fn open_with_config(paths: WorkspacePaths, config: WorkspaceConfig) -> Result<Self> {
        create_private_dir_all(&paths.state_dir).with_context(|| {
            format!("failed to create state directory `{}`", paths.state_dir.display())
        })?;

        let records: Arc<dyn RecordStore> =
            Arc::new(FsRecordStore::open(&paths.records_dir).context("failed to open records")?);
        let content =
            ContentStore::open(&paths.objects_dir).context("failed to open content store")?;
        let versions =
            VersionStore::open(records.clone(), content).context("failed to open version store")?;
        let versions = Arc::new(versions);

        if versions.index_was_reset() {
            let files = versions.rebuild_index().context("failed to rebuild version index")?;
            warn!(files, "version index rebuilt from version records");
        }

        let excludes = config.index.exclude.clone();
        let indexer = Indexer::new(paths.root.clone(), records.clone(), excludes.clone());
        let vcs: Box<dyn VcsProbe> = if config.snapshots.capture_git {
            Box::new(GitProbe::new(paths.root.clone()))
        } else {
            Box::new(NoVcs)
        };
        let snapshots =
            SnapshotStore::new(paths.root.clone(), records, versions.clone(), excludes, vcs);

        info!(root = %paths.root.display(), "workspace opened");
        Ok(Self { paths, config, versions, indexer, snapshots })
    }

    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    pub fn root(&self) -> &Path {
        &self.paths.root
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn versions(&self) -> &Arc<VersionStore> {
        &self.versions
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Resolve `anchor` against the current on-disk content of `path`.
    pub fn resolve_anchor(&self, path: &str, anchor: &AnchorTarget) -> StoreResult<Resolution> {
        let absolute = resolve_within_root(&self.paths.root, path)?;
        let text = fs::read_to_string(&absolute).at(&absolute)?;
        let headings = parse_headings(&text);
        Ok(anchor::resolve(&text, &headings, anchor))
    }

    /// Start auto-versioning with this workspace's settings.
    pub fn start_watcher(&self) -> Result<(ChangeWatcher, mpsc::Receiver<WatcherEvent>)> {
        ChangeWatcher::start(&self.paths.root, self.versions.clone(), self.config.watcher_config())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use folio_common::types::VersionSource;
    use tempfile::tempdir;

    fn open(root: &Path) -> Workspace {
        let mut config = WorkspaceConfig::default();
        config.snapshots.capture_git = false;
        Workspace::open_with_config(WorkspacePaths::resolve(root).unwrap(), config).unwrap()
    }

    // ── open ─────────────────────────────────────────────────────────

    #[test]
    fn open_creates_state_layout() {
        let tmp = tempdir().unwrap();
        let workspace = open(tmp.path());

        let paths = workspace.paths();
        assert!(paths.state_dir.is_dir());
        assert!(paths.records_dir.is_dir());
        assert!(paths.objects_dir.join("sha256").is_dir());
        assert_eq!(paths.root, tmp.path().canonicalize().unwrap());
    }

    #[test]
    fn open_reads_workspace_config() {
        let tmp = tempdir().unwrap();
        let mut config = WorkspaceConfig::default();
        config.versioning.debounce_ms = 400;
        config.save(tmp.path()).unwrap();

        let workspace = Workspace::open(tmp.path()).unwrap();
        assert_eq!(workspace.config().versioning.debounce_ms, 400);
    }

    #[test]
    fn open_rejects_missing_root() {
        assert!(Workspace::open(Path::new("/nonexistent/folio/root")).is_err());
    }

    #[test]
    fn corrupt_version_index_is_rebuilt_on_open() {
        let tmp = tempdir().unwrap();
        {
            let workspace = open(tmp.path());
            workspace.versions().create_version("a.md", b"one", VersionSource::Auto).unwrap();
            workspace.versions().create_version("a.md", b"two", VersionSource::Auto).unwrap();
        }
        let index_path = tmp.path().join(".folio/records/versions/index.json");
        fs::write(&index_path, "{ not json").unwrap();

        let workspace = open(tmp.path());
        let files = workspace.versions().list_files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_path, "a.md");
        assert_eq!(files[0].version_count, 2);
    }

    // ── resolve_anchor ───────────────────────────────────────────────

    #[test]
    fn resolve_anchor_reads_current_file() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("doc.md"), "# A\nThe quick fox jumps.").unwrap();
        let workspace = open(tmp.path());

        let anchor = AnchorTarget::Selection {
            quote: "quick fox".into(),
            prefix: None,
            suffix: None,
            section_id_hint: None,
        };
        let resolution = workspace.resolve_anchor("doc.md", &anchor).unwrap();
        assert_eq!(resolution, Resolution::Ok { start: 8, end: 17 });

        let section = AnchorTarget::Section { section_id: "a".into() };
        assert!(workspace.resolve_anchor("doc.md", &section).unwrap().is_found());
    }

    #[test]
    fn resolve_anchor_rejects_escaping_path() {
        let tmp = tempdir().unwrap();
        let workspace = open(tmp.path());

        let error = workspace.resolve_anchor("../outside.md", &AnchorTarget::File).unwrap_err();
        assert!(matches!(error, StoreError::PathTraversal { .. }));
    }
}
