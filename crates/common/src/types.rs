// Core domain types shared between the folio engine and its callers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;

// ── Sections ───────────────────────────────────────────────────────

/// A heading-delimited section within a markdown document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Heading {
    /// Stable ID: ancestor slug chain, e.g. "root/api/authentication".
    pub section_id: String,
    /// Enclosing section, derived from heading levels.
    pub parent_id: Option<String>,
    /// Heading level (1-6).
    pub level: u8,
    pub title: String,
    /// Line of the heading itself (1-based).
    pub line_start: u32,
    /// First line after the section's subtree (1-based, exclusive).
    pub line_end: u32,
    /// Char offset of the heading line start.
    pub char_start: usize,
    /// Char offset where the section's subtree ends (exclusive).
    pub char_end: usize,
}

impl Heading {
    /// True if the char offset falls inside this section's range.
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.char_start && offset < self.char_end
    }
}

// ── Index ──────────────────────────────────────────────────────────

/// The parsed, cached view of one markdown file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexedFile {
    /// Hash of the relative path, stable across content edits.
    pub file_id: String,
    pub path: String,
    pub title: String,
    pub content_hash: ContentHash,
    pub size: u64,
    pub mtime_ms: i64,
    pub line_count: usize,
    pub headings: Vec<Heading>,
}

/// Change-detection state of one file as of the last scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    pub file_id: String,
    pub mtime_ms: i64,
    pub size: u64,
    pub content_hash: ContentHash,
}

/// Result of the most recent scan, regenerated in full every time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanManifest {
    pub generated_at: DateTime<Utc>,
    pub root_path: String,
    pub files: BTreeMap<String, ManifestEntry>,
}

impl ScanManifest {
    pub fn empty(root_path: impl Into<String>) -> Self {
        Self { generated_at: Utc::now(), root_path: root_path.into(), files: BTreeMap::new() }
    }
}

// ── Versions ───────────────────────────────────────────────────────

/// What triggered a version.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VersionSource {
    /// Recorded by the change watcher.
    Auto,
    /// Requested explicitly (snapshot capture, user save point).
    Manual,
}

/// An immutable record of a file's content at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileVersion {
    pub id: String,
    pub file_path: String,
    pub content_hash: ContentHash,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub created_by: VersionSource,
    pub previous_version_id: Option<String>,
    pub line_count: usize,
    /// Per-file ordinal, 1 for the first version ever recorded.
    pub number: u64,
}

/// Per-file pointer to the head of its version chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionIndexEntry {
    pub latest_version_id: String,
    pub version_count: usize,
    pub latest_content_hash: ContentHash,
    #[serde(default)]
    pub last_number: u64,
}

/// Summary row returned by `VersionStore::list_files`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackedFile {
    pub file_path: String,
    pub version_count: usize,
    pub latest_version_id: String,
}

// ── Snapshots ──────────────────────────────────────────────────────

/// One file as captured by a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub file_path: String,
    /// On-disk spelling of the path when it differs from `file_path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_path: Option<String>,
    pub version_id: String,
    pub content_hash: ContentHash,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotStats {
    pub total_files: usize,
    pub total_size: u64,
}

/// Opaque VCS state recorded alongside a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitInfo {
    pub head: Option<String>,
    pub branch: Option<String>,
    pub dirty: bool,
}

/// A named point-in-time capture of every tracked file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub file_manifest: Vec<SnapshotEntry>,
    pub stats: SnapshotStats,
    pub git_info: Option<GitInfo>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Unchanged,
    Modified,
    Deleted,
    Added,
}

/// Classification of one file when comparing a snapshot to the live tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffEntry {
    pub file_path: String,
    pub status: DiffStatus,
    pub snapshot_hash: Option<ContentHash>,
    pub current_hash: Option<ContentHash>,
}

/// A file that could not be restored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestoreFailure {
    pub file_path: String,
    pub message: String,
}

/// Outcome of a partial-failure tolerant restore.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored_count: usize,
    pub errors: Vec<RestoreFailure>,
}
