// Per-file version chains over the content store.
//
// Records:
//   versions/index.json                 path -> VersionIndexEntry
//   versions/<file_id>/<version_id>.json one FileVersion each
//
// The version record is written before the index, so a crash between the two
// leaves an extra record that `rebuild_index` picks up.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use folio_common::hash::{file_id, sha256_hex};
use folio_common::path::normalize_path;
use folio_common::types::{FileVersion, TrackedFile, VersionIndexEntry, VersionSource};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::content::ContentStore;
use super::records::{load_all_lenient, load_record, save_record, RecordStore};
use crate::error::{StoreError, StoreResult};

pub const VERSIONS_COLLECTION: &str = "versions";
const INDEX_KEY: &str = "index";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct VersionIndex {
    files: BTreeMap<String, VersionIndexEntry>,
}

pub struct VersionStore {
    records: Arc<dyn RecordStore>,
    content: ContentStore,
    index: Mutex<VersionIndex>,
    index_was_reset: bool,
}

impl VersionStore {
    /// Load the version index. A corrupt or unreadable index is replaced by
    /// an empty one (see [`VersionStore::index_was_reset`]).
    pub fn open(records: Arc<dyn RecordStore>, content: ContentStore) -> StoreResult<Self> {
        let loaded: StoreResult<Option<VersionIndex>> =
            load_record(records.as_ref(), "version index", VERSIONS_COLLECTION, INDEX_KEY);
        let (index, index_was_reset) = match loaded {
            Ok(Some(index)) => (index, false),
            Ok(None) => (VersionIndex::default(), false),
            Err(error) => {
                warn!(error = %error, "version index unreadable; starting from an empty index");
                (VersionIndex::default(), true)
            }
        };

        Ok(Self { records, content, index: Mutex::new(index), index_was_reset })
    }

    /// True when `open` had to discard a corrupt index.
    pub fn index_was_reset(&self) -> bool {
        self.index_was_reset
    }

    pub fn content(&self) -> &ContentStore {
        &self.content
    }

    /// Record a new version of `path` unless `content` matches the latest one.
    pub fn create_version(
        &self,
        path: &str,
        content: &[u8],
        source: VersionSource,
    ) -> StoreResult<Option<FileVersion>> {
        let key = normalize_key(path)?;
        let mut index = self.index.lock().expect("version index lock poisoned");
        let previous = index.files.get(&key).cloned();

        if previous.as_ref().is_some_and(|entry| entry.latest_content_hash == sha256_hex(content)) {
            trace!(path = %key, "content unchanged; no version created");
            return Ok(None);
        }

        let content_hash = self.content.store(content)?;
        let number = previous
            .as_ref()
            .map_or(0, |entry| entry.last_number.max(entry.version_count as u64))
            + 1;
        let version = FileVersion {
            id: Uuid::new_v4().to_string(),
            file_path: key.clone(),
            content_hash: content_hash.clone(),
            size: content.len() as u64,
            created_at: Utc::now(),
            created_by: source,
            previous_version_id: previous.as_ref().map(|entry| entry.latest_version_id.clone()),
            line_count: String::from_utf8_lossy(content).lines().count(),
            number,
        };

        let chain = chain_collection(&key);
        save_record(self.records.as_ref(), "version", &chain, &version.id, &version)?;

        let entry = VersionIndexEntry {
            latest_version_id: version.id.clone(),
            version_count: previous.as_ref().map_or(0, |entry| entry.version_count) + 1,
            latest_content_hash: content_hash,
            last_number: number,
        };
        index.files.insert(key.clone(), entry);
        if let Err(error) = self.persist_index(&index) {
            // Keep memory in step with the index on disk.
            match previous {
                Some(previous) => index.files.insert(key.clone(), previous),
                None => index.files.remove(&key),
            };
            return Err(error);
        }

        debug!(path = %key, version_id = %version.id, number, source = ?source, "created version");
        Ok(Some(version))
    }

    pub fn get_version(&self, path: &str, version_id: &str) -> StoreResult<FileVersion> {
        let key = normalize_key(path)?;
        let chain = chain_collection(&key);
        load_record::<FileVersion>(self.records.as_ref(), "version", &chain, version_id)?
            .filter(|version| version.file_path == key)
            .ok_or_else(|| StoreError::not_found("version", version_id))
    }

    /// Bytes of a version. A version whose blob is gone is `ContentMissing`.
    pub fn get_content(&self, path: &str, version_id: &str) -> StoreResult<Vec<u8>> {
        let version = self.get_version(path, version_id)?;
        self.read_blob(&version.content_hash)
    }

    /// Read a blob referenced by version metadata.
    pub fn read_blob(&self, hash: &str) -> StoreResult<Vec<u8>> {
        self.content.read(hash).map_err(|error| match error {
            StoreError::NotFound { .. } => StoreError::ContentMissing { hash: hash.to_string() },
            other => other,
        })
    }

    /// Versions of `path`, newest first. Unknown paths yield an empty list.
    pub fn list_versions(&self, path: &str) -> StoreResult<Vec<FileVersion>> {
        let key = normalize_key(path)?;
        self.load_chain(&key)
    }

    pub fn latest(&self, path: &str) -> StoreResult<Option<VersionIndexEntry>> {
        let key = normalize_key(path)?;
        let index = self.index.lock().expect("version index lock poisoned");
        Ok(index.files.get(&key).cloned())
    }

    /// Every file with recorded history, sorted by path.
    pub fn list_files(&self) -> Vec<TrackedFile> {
        let index = self.index.lock().expect("version index lock poisoned");
        index
            .files
            .iter()
            .map(|(path, entry)| TrackedFile {
                file_path: path.clone(),
                version_count: entry.version_count,
                latest_version_id: entry.latest_version_id.clone(),
            })
            .collect()
    }

    /// Keep the `max_count` newest versions of `path`; the latest version is
    /// kept even when `max_count` is 0. Returns how many were deleted.
    pub fn prune_old_versions(&self, path: &str, max_count: usize) -> StoreResult<usize> {
        let key = normalize_key(path)?;
        let mut index = self.index.lock().expect("version index lock poisoned");
        let latest_id = index.files.get(&key).map(|entry| entry.latest_version_id.clone());
        let Some(latest_id) = latest_id else {
            return Ok(0);
        };

        let doomed: Vec<FileVersion> = self
            .load_chain(&key)?
            .into_iter()
            .skip(max_count)
            .filter(|version| version.id != latest_id)
            .collect();

        self.delete_versions(&mut index, &key, &doomed)
    }

    /// Delete every version created before `cutoff`, except each file's
    /// latest. Returns how many were deleted.
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let mut index = self.index.lock().expect("version index lock poisoned");
        let tracked: Vec<(String, String)> = index
            .files
            .iter()
            .map(|(path, entry)| (path.clone(), entry.latest_version_id.clone()))
            .collect();

        let mut removed = 0;
        for (key, latest_id) in tracked {
            let doomed: Vec<FileVersion> = self
                .load_chain(&key)?
                .into_iter()
                .filter(|version| version.created_at < cutoff && version.id != latest_id)
                .collect();
            removed += self.delete_versions(&mut index, &key, &doomed)?;
        }
        Ok(removed)
    }

    pub fn prune_by_retention(&self, days: u32) -> StoreResult<usize> {
        self.prune_older_than(Utc::now() - Duration::days(i64::from(days)))
    }

    /// Re-derive the index from the version records on disk. Returns the
    /// number of files indexed.
    pub fn rebuild_index(&self) -> StoreResult<usize> {
        let mut rebuilt = VersionIndex::default();

        for chain in self.records.children(VERSIONS_COLLECTION)? {
            let collection = format!("{VERSIONS_COLLECTION}/{chain}");
            let versions: Vec<FileVersion> =
                load_all_lenient(self.records.as_ref(), "version", &collection)?;
            let newest = versions.iter().max_by_key(|version| (version.created_at, version.number));
            let Some(latest) = newest else {
                continue;
            };

            rebuilt.files.insert(
                latest.file_path.clone(),
                VersionIndexEntry {
                    latest_version_id: latest.id.clone(),
                    version_count: versions.len(),
                    latest_content_hash: latest.content_hash.clone(),
                    last_number: versions.iter().map(|version| version.number).max().unwrap_or(0),
                },
            );
        }

        let mut index = self.index.lock().expect("version index lock poisoned");
        *index = rebuilt;
        self.persist_index(&index)?;
        info!(files = index.files.len(), "rebuilt version index");
        Ok(index.files.len())
    }

    fn load_chain(&self, key: &str) -> StoreResult<Vec<FileVersion>> {
        let mut versions: Vec<FileVersion> =
            load_all_lenient(self.records.as_ref(), "version", &chain_collection(key))?;
        versions.retain(|version| version.file_path == key);
        versions.sort_by_key(|version| Reverse((version.created_at, version.number)));
        Ok(versions)
    }

    fn delete_versions(
        &self,
        index: &mut VersionIndex,
        key: &str,
        doomed: &[FileVersion],
    ) -> StoreResult<usize> {
        if doomed.is_empty() {
            return Ok(0);
        }

        let collection = chain_collection(key);
        let mut removed = 0;
        let mut failure = None;
        for version in doomed {
            match self.records.delete(&collection, &version.id) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }

        // Count what is actually gone, even when a delete failed part way.
        if let Some(entry) = index.files.get_mut(key) {
            entry.version_count = entry.version_count.saturating_sub(removed);
        }
        let persisted = self.persist_index(index);
        debug!(path = %key, removed, "pruned versions");
        match failure {
            Some(error) => Err(error),
            None => persisted.map(|()| removed),
        }
    }

    fn persist_index(&self, index: &VersionIndex) -> StoreResult<()> {
        save_record(self.records.as_ref(), "version index", VERSIONS_COLLECTION, INDEX_KEY, index)
    }
}

fn normalize_key(path: &str) -> StoreResult<String> {
    normalize_path(path).map_err(|error| StoreError::from_path_error(path, error))
}

fn chain_collection(key: &str) -> String {
    format!("{VERSIONS_COLLECTION}/{}", file_id(key))
}
