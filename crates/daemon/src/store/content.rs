// Content-addressed blob storage.
//
// Layout: `<objects>/sha256/<first 2 hex>/<remaining 62 hex>`. A blob's name
// is the SHA-256 of its bytes, so identical content is stored once and blobs
// are never rewritten.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use folio_common::hash::{is_content_hash, sha256_hex, ContentHash};
use tracing::{debug, trace};

use super::atomic::write_atomic;
use crate::error::{IoContext, StoreError, StoreResult};
use crate::security::create_private_dir_all;

const ALGORITHM_DIR: &str = "sha256";

#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Open (creating if needed) the blob store under `objects_dir`.
    pub fn open(objects_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let root = objects_dir.as_ref().join(ALGORITHM_DIR);
        create_private_dir_all(&root).at(&root)?;
        Ok(Self { root })
    }

    /// Store `bytes`, returning their hash. Existing blobs are left untouched.
    pub fn store(&self, bytes: &[u8]) -> StoreResult<ContentHash> {
        let hash = sha256_hex(bytes);
        let path = self.path_for(&hash);

        if path.is_file() {
            trace!(hash = %hash, "blob already stored");
            return Ok(hash);
        }

        if let Some(shard) = path.parent() {
            create_private_dir_all(shard).at(shard)?;
        }
        write_atomic(&path, bytes).at(&path)?;
        debug!(hash = %hash, size = bytes.len(), "stored blob");
        Ok(hash)
    }

    /// Read a blob back, verifying it still hashes to its name.
    pub fn read(&self, hash: &str) -> StoreResult<Vec<u8>> {
        let Some(path) = self.blob_path(hash) else {
            return Err(StoreError::not_found("blob", hash));
        };

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::not_found("blob", hash));
            }
            Err(error) => return Err(StoreError::io(path, error)),
        };

        if sha256_hex(&bytes) != hash {
            return Err(StoreError::CorruptBlob { hash: hash.to_string(), path });
        }
        Ok(bytes)
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.blob_path(hash).is_some_and(|path| path.is_file())
    }

    /// On-disk location for `hash`, or `None` if it is not a valid digest.
    pub fn blob_path(&self, hash: &str) -> Option<PathBuf> {
        is_content_hash(hash).then(|| self.path_for(hash))
    }

    fn path_for(&self, hash: &str) -> PathBuf {
        let (shard, rest) = hash.split_at(2);
        self.root.join(shard).join(rest)
    }
}
