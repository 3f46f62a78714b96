// Keyed JSON record persistence.
//
// Records live at `<records_dir>/<collection>/<key>.json`. Collections may be
// nested (`versions/<file_id>`); keys are single path segments. Every record
// is wrapped in an envelope carrying `schema_version`.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::atomic::write_atomic;
use crate::error::{IoContext, StoreError, StoreResult};
use crate::security::create_private_dir_all;

pub const SCHEMA_VERSION: u32 = 1;

const RECORD_EXT: &str = "json";

/// Byte-level key/value persistence grouped by collection.
pub trait RecordStore: Send + Sync {
    fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Replace the record atomically.
    fn put(&self, collection: &str, key: &str, bytes: &[u8]) -> StoreResult<()>;

    /// Returns whether a record was removed.
    fn delete(&self, collection: &str, key: &str) -> StoreResult<bool>;

    /// Keys of the records directly inside `collection`, sorted.
    fn keys(&self, collection: &str) -> StoreResult<Vec<String>>;

    /// Names of the collections nested directly under `collection`, sorted.
    fn children(&self, collection: &str) -> StoreResult<Vec<String>>;

    /// Human-readable location used in corruption errors.
    fn location(&self, collection: &str, key: &str) -> PathBuf;
}

#[derive(Serialize)]
struct EnvelopeOut<'a, T> {
    schema_version: u32,
    #[serde(flatten)]
    payload: &'a T,
}

#[derive(Deserialize)]
struct EnvelopeIn<T> {
    schema_version: u32,
    #[serde(flatten)]
    payload: T,
}

/// Load and decode a record. Missing records are `Ok(None)`; undecodable
/// ones are `CorruptIndex`.
pub fn load_record<T: DeserializeOwned>(
    store: &dyn RecordStore,
    what: &'static str,
    collection: &str,
    key: &str,
) -> StoreResult<Option<T>> {
    let Some(bytes) = store.get(collection, key)? else {
        return Ok(None);
    };

    let envelope: EnvelopeIn<T> = serde_json::from_slice(&bytes)
        .map_err(|error| StoreError::corrupt(what, store.location(collection, key), error))?;
    if envelope.schema_version != SCHEMA_VERSION {
        return Err(StoreError::corrupt(
            what,
            store.location(collection, key),
            format!("unsupported schema_version {}", envelope.schema_version),
        ));
    }
    Ok(Some(envelope.payload))
}

pub fn save_record<T: Serialize>(
    store: &dyn RecordStore,
    what: &'static str,
    collection: &str,
    key: &str,
    payload: &T,
) -> StoreResult<()> {
    let envelope = EnvelopeOut { schema_version: SCHEMA_VERSION, payload };
    let bytes = serde_json::to_vec_pretty(&envelope)
        .map_err(|error| StoreError::corrupt(what, store.location(collection, key), error))?;
    store.put(collection, key, &bytes)
}

/// Decode every record in a collection, skipping (and logging) the ones that
/// fail to decode.
pub fn load_all_lenient<T: DeserializeOwned>(
    store: &dyn RecordStore,
    what: &'static str,
    collection: &str,
) -> StoreResult<Vec<T>> {
    let mut out = Vec::new();
    for key in store.keys(collection)? {
        match load_record(store, what, collection, &key) {
            Ok(Some(record)) => out.push(record),
            Ok(None) => {}
            Err(error) => {
                warn!(collection, key = %key, error = %error, "skipping unreadable record");
            }
        }
    }
    Ok(out)
}

// ── Filesystem backend ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FsRecordStore {
    root: PathBuf,
}

impl FsRecordStore {
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        create_private_dir_all(&root).at(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: &str) -> StoreResult<PathBuf> {
        let mut dir = self.root.clone();
        for segment in collection.split('/') {
            check_segment(segment)?;
            dir.push(segment);
        }
        Ok(dir)
    }

    fn record_path(&self, collection: &str, key: &str) -> StoreResult<PathBuf> {
        check_segment(key)?;
        Ok(self.collection_dir(collection)?.join(format!("{key}.{RECORD_EXT}")))
    }
}

impl RecordStore for FsRecordStore {
    fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.record_path(collection, key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(StoreError::io(path, error)),
        }
    }

    fn put(&self, collection: &str, key: &str, bytes: &[u8]) -> StoreResult<()> {
        let dir = self.collection_dir(collection)?;
        create_private_dir_all(&dir).at(&dir)?;
        let path = self.record_path(collection, key)?;
        write_atomic(&path, bytes).at(path)
    }

    fn delete(&self, collection: &str, key: &str) -> StoreResult<bool> {
        let path = self.record_path(collection, key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(StoreError::io(path, error)),
        }
    }

    fn keys(&self, collection: &str) -> StoreResult<Vec<String>> {
        let dir = self.collection_dir(collection)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(StoreError::io(dir, error)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.at(&dir)?;
            let path = entry.path();
            let is_record = path.extension().and_then(|ext| ext.to_str()) == Some(RECORD_EXT);
            if !path.is_file() || !is_record {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            // Temp files from interrupted atomic writes start with a dot.
            if !stem.starts_with('.') {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn children(&self, collection: &str) -> StoreResult<Vec<String>> {
        let dir = self.collection_dir(collection)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(StoreError::io(dir, error)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.at(&dir)?;
            if entry.path().is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn location(&self, collection: &str, key: &str) -> PathBuf {
        self.root.join(collection).join(format!("{key}.{RECORD_EXT}"))
    }
}

fn check_segment(segment: &str) -> StoreResult<()> {
    let valid = !segment.is_empty()
        && !segment.starts_with('.')
        && segment.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::PathTraversal { path: segment.to_string() })
    }
}

// ── In-memory backend ───────────────────────────────────────────────

/// Record store for tests and ephemeral workspaces.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    collections: Mutex<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let collections = self.collections.lock().expect("record store lock poisoned");
        Ok(collections.get(collection).and_then(|records| records.get(key)).cloned())
    }

    fn put(&self, collection: &str, key: &str, bytes: &[u8]) -> StoreResult<()> {
        let mut collections = self.collections.lock().expect("record store lock poisoned");
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, collection: &str, key: &str) -> StoreResult<bool> {
        let mut collections = self.collections.lock().expect("record store lock poisoned");
        Ok(collections.get_mut(collection).is_some_and(|records| records.remove(key).is_some()))
    }

    fn keys(&self, collection: &str) -> StoreResult<Vec<String>> {
        let collections = self.collections.lock().expect("record store lock poisoned");
        Ok(collections
            .get(collection)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn children(&self, collection: &str) -> StoreResult<Vec<String>> {
        let collections = self.collections.lock().expect("record store lock poisoned");
        let prefix = format!("{collection}/");
        let mut names: Vec<String> = collections
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .filter_map(|(name, _)| name.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn location(&self, collection: &str, key: &str) -> PathBuf {
        PathBuf::from(format!("memory://{collection}/{key}"))
    }
}
