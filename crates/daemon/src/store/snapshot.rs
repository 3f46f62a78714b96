// Named point-in-time captures of the whole workspace.
//
// A snapshot references one version per file, so capturing forces a manual
// version for every file whose content moved since its latest version.
// Records: snapshots/<snapshot_id>.json

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use folio_common::hash::{sha256_hex, ContentHash};
use folio_common::types::{
    DiffEntry, DiffStatus, RestoreFailure, RestoreReport, Snapshot, SnapshotEntry, SnapshotStats,
    VersionSource,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::records::{load_all_lenient, load_record, save_record, RecordStore};
use super::versions::VersionStore;
use crate::error::{IoContext, StoreError, StoreResult};
use crate::git::probe::VcsProbe;
use crate::index::walk::collect_markdown_files;
use crate::security::resolve_within_root;

pub const SNAPSHOTS_COLLECTION: &str = "snapshots";

/// Where `restore` writes files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreTarget {
    /// Back to their original location in the workspace.
    Overwrite,
    /// Into `dir/<file_path>`, leaving the workspace untouched.
    Extract(PathBuf),
}

pub struct SnapshotStore {
    root: PathBuf,
    records: Arc<dyn RecordStore>,
    versions: Arc<VersionStore>,
    excludes: Vec<String>,
    vcs: Box<dyn VcsProbe>,
}

impl SnapshotStore {
    pub fn new(
        root: impl Into<PathBuf>,
        records: Arc<dyn RecordStore>,
        versions: Arc<VersionStore>,
        excludes: Vec<String>,
        vcs: Box<dyn VcsProbe>,
    ) -> Self {
        Self { root: root.into(), records, versions, excludes, vcs }
    }

    pub fn create(&self, name: &str, description: &str) -> StoreResult<Snapshot> {
        let mut file_manifest = Vec::new();

        for file in collect_markdown_files(&self.root, &self.excludes)? {
            let disk_path = (file.relative != file.key).then(|| file.relative.clone());
            let bytes = match fs::read(&file.path) {
                Ok(bytes) => bytes,
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %file.key, "file vanished during snapshot");
                    continue;
                }
                Err(error) => return Err(StoreError::io(&file.path, error)),
            };

            let created = self.versions.create_version(&file.key, &bytes, VersionSource::Manual)?;
            let entry = match created {
                Some(version) => SnapshotEntry {
                    file_path: version.file_path,
                    disk_path,
                    version_id: version.id,
                    content_hash: version.content_hash,
                    size: version.size,
                },
                None => {
                    let latest = self
                        .versions
                        .latest(&file.key)?
                        .ok_or_else(|| StoreError::not_found("version index entry", &file.key))?;
                    SnapshotEntry {
                        file_path: file.key.clone(),
                        disk_path,
                        version_id: latest.latest_version_id,
                        content_hash: latest.latest_content_hash,
                        size: bytes.len() as u64,
                    }
                }
            };
            file_manifest.push(entry);
        }

        let stats = SnapshotStats {
            total_files: file_manifest.len(),
            total_size: file_manifest.iter().map(|entry| entry.size).sum(),
        };
        let snapshot = Snapshot {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
            file_manifest,
            stats,
            git_info: self.vcs.probe(),
        };

        let records = self.records.as_ref();
        save_record(records, "snapshot", SNAPSHOTS_COLLECTION, &snapshot.id, &snapshot)?;
        info!(
            snapshot_id = %snapshot.id,
            name = %snapshot.name,
            files = stats.total_files,
            bytes = stats.total_size,
            "snapshot created"
        );
        Ok(snapshot)
    }

    /// All readable snapshots, newest first.
    pub fn list(&self) -> StoreResult<Vec<Snapshot>> {
        let mut snapshots: Vec<Snapshot> =
            load_all_lenient(self.records.as_ref(), "snapshot", SNAPSHOTS_COLLECTION)?;
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(snapshots)
    }

    pub fn get(&self, snapshot_id: &str) -> StoreResult<Snapshot> {
        load_record(self.records.as_ref(), "snapshot", SNAPSHOTS_COLLECTION, snapshot_id)?
            .ok_or_else(|| StoreError::not_found("snapshot", snapshot_id))
    }

    /// Returns whether the snapshot existed. Versions and blobs it referenced
    /// are left in place.
    pub fn delete(&self, snapshot_id: &str) -> StoreResult<bool> {
        let removed = self.records.delete(SNAPSHOTS_COLLECTION, snapshot_id)?;
        if removed {
            info!(snapshot_id, "snapshot deleted");
        }
        Ok(removed)
    }

    /// Compare a snapshot against the files currently on disk, sorted by path.
    pub fn diff(&self, snapshot_id: &str) -> StoreResult<Vec<DiffEntry>> {
        let snapshot = self.get(snapshot_id)?;
        let mut current = self.current_hashes()?;
        let mut entries = Vec::with_capacity(snapshot.file_manifest.len());

        for captured in &snapshot.file_manifest {
            let current_hash = current.remove(&captured.file_path);
            let status = match &current_hash {
                None => DiffStatus::Deleted,
                Some(hash) if *hash == captured.content_hash => DiffStatus::Unchanged,
                Some(_) => DiffStatus::Modified,
            };
            entries.push(DiffEntry {
                file_path: captured.file_path.clone(),
                status,
                snapshot_hash: Some(captured.content_hash.clone()),
                current_hash,
            });
        }

        entries.extend(current.into_iter().map(|(file_path, hash)| DiffEntry {
            file_path,
            status: DiffStatus::Added,
            snapshot_hash: None,
            current_hash: Some(hash),
        }));
        entries.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        Ok(entries)
    }

    /// Write every captured file back out. Per-file failures are collected
    /// in the report; only a missing or unreadable snapshot fails the call.
    pub fn restore(&self, snapshot_id: &str, target: &RestoreTarget) -> StoreResult<RestoreReport> {
        let snapshot = self.get(snapshot_id)?;
        let base = match target {
            RestoreTarget::Overwrite => self.root.as_path(),
            RestoreTarget::Extract(dir) => dir.as_path(),
        };

        let mut report = RestoreReport::default();
        for entry in &snapshot.file_manifest {
            match self.restore_entry(base, entry) {
                Ok(()) => report.restored_count += 1,
                Err(error) => {
                    warn!(path = %entry.file_path, error = %error, "failed to restore file");
                    report.errors.push(RestoreFailure {
                        file_path: entry.file_path.clone(),
                        message: error.to_string(),
                    });
                }
            }
        }

        info!(
            snapshot_id,
            restored = report.restored_count,
            failed = report.errors.len(),
            "snapshot restored"
        );
        Ok(report)
    }

    fn restore_entry(&self, base: &Path, entry: &SnapshotEntry) -> StoreResult<()> {
        let relative = entry.disk_path.as_deref().unwrap_or(&entry.file_path);
        let destination = resolve_within_root(base, relative)?;
        let bytes = self.versions.read_blob(&entry.content_hash)?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).at(parent)?;
        }
        fs::write(&destination, bytes).at(&destination)
    }

    fn current_hashes(&self) -> StoreResult<BTreeMap<String, ContentHash>> {
        let mut hashes = BTreeMap::new();
        for file in collect_markdown_files(&self.root, &self.excludes)? {
            match fs::read(&file.path) {
                Ok(bytes) => {
                    hashes.insert(file.key, sha256_hex(&bytes));
                }
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => return Err(StoreError::io(&file.path, error)),
            }
        }
        Ok(hashes)
    }
}
