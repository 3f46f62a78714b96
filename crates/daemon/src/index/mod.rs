// Incremental markdown indexer.
//
// Change detection per file, cheapest first:
//   1. (mtime, size) equal to the previous manifest entry: reuse the cached
//      parse without reading the file
//   2. content hash equal to the previous one: reuse the cached parse
//   3. otherwise read, parse and cache
//
// Records:
//   index/manifest.json          ScanManifest of the most recent scan
//   index/files/<file_id>.json   cached IndexedFile

pub mod walk;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use chrono::Utc;
use folio_common::hash::{file_id, sha256_hex};
use folio_common::path::normalize_path;
use folio_common::section::parser::parse_headings;
use folio_common::section::tree::{build_section_tree, SectionNode};
use folio_common::types::{Heading, IndexedFile, ManifestEntry, ScanManifest};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use self::walk::{collect_markdown_files, WalkedFile};
use crate::error::{IoContext, StoreError, StoreResult};
use crate::store::records::{load_record, save_record, RecordStore};

const INDEX_COLLECTION: &str = "index";
const FILES_COLLECTION: &str = "index/files";
const MANIFEST_KEY: &str = "manifest";

/// Turns markdown into its heading list.
pub trait HeadingParser: Send + Sync {
    fn parse(&self, markdown: &str) -> Vec<Heading>;
}

/// ATX heading parser backed by pulldown-cmark.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownHeadingParser;

impl HeadingParser for MarkdownHeadingParser {
    fn parse(&self, markdown: &str) -> Vec<Heading> {
        parse_headings(markdown)
    }
}

/// How each file was handled by a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Reused on matching mtime and size.
    pub unchanged: usize,
    /// Re-hashed, content identical; cached parse reused.
    pub rehashed: usize,
    /// Read and parsed.
    pub parsed: usize,
    /// Present in the previous scan, gone now.
    pub removed: usize,
}

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Sorted by path.
    pub files: Vec<IndexedFile>,
    pub manifest: ScanManifest,
    pub stats: ScanStats,
}

pub struct Indexer<P: HeadingParser = MarkdownHeadingParser> {
    root: PathBuf,
    records: Arc<dyn RecordStore>,
    excludes: Vec<String>,
    parser: P,
}

impl Indexer<MarkdownHeadingParser> {
    pub fn new(
        root: impl Into<PathBuf>,
        records: Arc<dyn RecordStore>,
        excludes: Vec<String>,
    ) -> Self {
        Self::with_parser(root, records, excludes, MarkdownHeadingParser)
    }
}

impl<P: HeadingParser> Indexer<P> {
    pub fn with_parser(
        root: impl Into<PathBuf>,
        records: Arc<dyn RecordStore>,
        excludes: Vec<String>,
        parser: P,
    ) -> Self {
        Self { root: root.into(), records, excludes, parser }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan the tree, reusing cached parses where change detection allows,
    /// and persist the regenerated manifest.
    pub fn scan_incremental(&self) -> StoreResult<ScanOutcome> {
        let previous = self.load_previous_manifest();
        let walked = collect_markdown_files(&self.root, &self.excludes)?;

        let mut manifest = ScanManifest::empty(self.root.display().to_string());
        let mut files = Vec::with_capacity(walked.len());
        let mut stats = ScanStats::default();

        for file in &walked {
            let prior = previous.as_ref().and_then(|manifest| manifest.files.get(&file.key));
            match self.index_file(file, prior, &mut stats) {
                Ok(indexed) => {
                    manifest.files.insert(
                        indexed.path.clone(),
                        ManifestEntry {
                            file_id: indexed.file_id.clone(),
                            mtime_ms: indexed.mtime_ms,
                            size: indexed.size,
                            content_hash: indexed.content_hash.clone(),
                        },
                    );
                    files.push(indexed);
                }
                // Deleted between the walk and the read.
                Err(StoreError::Io { source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound =>
                {
                    debug!(path = %file.key, "file vanished during scan");
                }
                Err(error) => return Err(error),
            }
        }

        // Swept against the cache itself: the previous manifest may be
        // missing or corrupt.
        let live: HashSet<&str> =
            manifest.files.values().map(|entry| entry.file_id.as_str()).collect();
        for cached in self.records.keys(FILES_COLLECTION)? {
            if !live.contains(cached.as_str()) {
                self.records.delete(FILES_COLLECTION, &cached)?;
                stats.removed += 1;
                trace!(file_id = %cached, "dropped from index");
            }
        }

        manifest.generated_at = Utc::now();
        let records = self.records.as_ref();
        save_record(records, "scan manifest", INDEX_COLLECTION, MANIFEST_KEY, &manifest)?;
        files.sort_by(|a, b| a.path.cmp(&b.path));

        info!(
            files = files.len(),
            parsed = stats.parsed,
            rehashed = stats.rehashed,
            unchanged = stats.unchanged,
            removed = stats.removed,
            "scan complete"
        );
        Ok(ScanOutcome { files, manifest, stats })
    }

    /// Cached index entry for `path` as of the last scan.
    pub fn read_indexed_file_by_path(&self, path: &str) -> StoreResult<IndexedFile> {
        let key = normalize_path(path).map_err(|error| StoreError::from_path_error(path, error))?;
        self.load_cached(&file_id(&key))?
            .filter(|indexed| indexed.path == key)
            .ok_or_else(|| StoreError::not_found("indexed file", key))
    }

    /// Nested section tree of an indexed file.
    pub fn section_tree(&self, path: &str) -> StoreResult<Vec<SectionNode>> {
        Ok(build_section_tree(&self.read_indexed_file_by_path(path)?.headings))
    }

    /// The manifest written by the last scan, if any.
    pub fn manifest(&self) -> StoreResult<Option<ScanManifest>> {
        load_record(self.records.as_ref(), "scan manifest", INDEX_COLLECTION, MANIFEST_KEY)
    }

    fn index_file(
        &self,
        file: &WalkedFile,
        prior: Option<&ManifestEntry>,
        stats: &mut ScanStats,
    ) -> StoreResult<IndexedFile> {
        let metadata = fs::metadata(&file.path).at(&file.path)?;
        let size = metadata.len();
        let mtime_ms = metadata
            .modified()
            .ok()
            .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |elapsed| elapsed.as_millis() as i64);

        let stat_matches =
            |prior: &&ManifestEntry| prior.mtime_ms == mtime_ms && prior.size == size;
        if let Some(prior) = prior.filter(stat_matches) {
            if let Some(cached) = self
                .load_cached(&prior.file_id)?
                .filter(|cached| cached.content_hash == prior.content_hash)
            {
                stats.unchanged += 1;
                return Ok(cached);
            }
        }

        let bytes = fs::read(&file.path).at(&file.path)?;
        let content_hash = sha256_hex(&bytes);
        let id = file_id(&file.key);

        if let Some(mut cached) =
            self.load_cached(&id)?.filter(|cached| cached.content_hash == content_hash)
        {
            stats.rehashed += 1;
            if cached.mtime_ms != mtime_ms || cached.size != size {
                cached.mtime_ms = mtime_ms;
                cached.size = size;
                self.store_cached(&cached)?;
            }
            return Ok(cached);
        }

        let text = String::from_utf8_lossy(&bytes);
        let headings = self.parser.parse(&text);
        let indexed = IndexedFile {
            file_id: id,
            path: file.key.clone(),
            title: extract_title(&headings, &file.path),
            content_hash,
            size,
            mtime_ms,
            line_count: text.lines().count(),
            headings,
        };
        self.store_cached(&indexed)?;
        stats.parsed += 1;
        trace!(path = %indexed.path, headings = indexed.headings.len(), "parsed");
        Ok(indexed)
    }

    fn load_previous_manifest(&self) -> Option<ScanManifest> {
        match self.manifest() {
            Ok(manifest) => manifest,
            Err(error) => {
                warn!(error = %error, "scan manifest unreadable; rescanning everything");
                None
            }
        }
    }

    fn load_cached(&self, id: &str) -> StoreResult<Option<IndexedFile>> {
        match load_record(self.records.as_ref(), "indexed file", FILES_COLLECTION, id) {
            Err(StoreError::CorruptIndex { path, reason, .. }) => {
                warn!(path = %path.display(), reason = %reason, "discarding corrupt cached parse");
                Ok(None)
            }
            other => other,
        }
    }

    fn store_cached(&self, indexed: &IndexedFile) -> StoreResult<()> {
        let records = self.records.as_ref();
        save_record(records, "indexed file", FILES_COLLECTION, &indexed.file_id, indexed)
    }
}

/// First level-1 heading, else the file stem.
pub fn extract_title(headings: &[Heading], path: &Path) -> String {
    headings
        .iter()
        .find(|heading| heading.level == 1 && !heading.title.is_empty())
        .map(|heading| heading.title.clone())
        .unwrap_or_else(|| {
            path.file_stem().and_then(|stem| stem.to_str()).unwrap_or("Untitled").to_string()
        })
}
