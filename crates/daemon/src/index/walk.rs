// Markdown file discovery for the indexer and snapshot capture.

use std::path::{Path, PathBuf};

use folio_common::path::{is_markdown, normalize_path, relative_path};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use crate::error::{StoreError, StoreResult};

/// Engine state directory, never part of the document tree.
pub const STATE_DIR: &str = ".folio";

/// A markdown file found under the workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    /// Normalized workspace key.
    pub key: String,
    /// Path relative to the root, spelled as on disk. Differs from `key`
    /// when the file name is not in NFKC form.
    pub relative: String,
    pub path: PathBuf,
}

/// Every markdown file under `root`, sorted by key.
///
/// Symlinks are not followed. Directories whose name appears in `excludes`
/// (and the state directory) are skipped along with their contents. When
/// several files normalize to the same key only one is returned: the one
/// already spelled as its key, otherwise the first by on-disk name.
pub fn collect_markdown_files(root: &Path, excludes: &[String]) -> StoreResult<Vec<WalkedFile>> {
    if !root.is_dir() {
        return Err(StoreError::not_found("workspace root", root.display().to_string()));
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_excluded_dir(entry, excludes));

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(error = %error, "skipping unreadable entry during scan");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_markdown(entry.path()) {
            continue;
        }

        match relative_path(root, entry.path()).and_then(|relative| {
            normalize_path(&relative).map(|key| (key, relative))
        }) {
            Ok((key, relative)) => {
                files.push(WalkedFile { key, relative, path: entry.into_path() });
            }
            Err(error) => {
                let path = entry.path().display();
                warn!(path = %path, error = %error, "skipping unaddressable file");
            }
        }
    }

    files.sort_by(|a, b| {
        a.key
            .cmp(&b.key)
            .then_with(|| (a.relative != a.key).cmp(&(b.relative != b.key)))
            .then_with(|| a.relative.cmp(&b.relative))
    });
    files.dedup_by(|duplicate, kept| {
        let same_key = duplicate.key == kept.key;
        if same_key {
            warn!(
                key = %kept.key,
                kept = %kept.relative,
                skipped = %duplicate.relative,
                "several files share one workspace key; skipping all but one"
            );
        }
        same_key
    });
    Ok(files)
}

fn is_excluded_dir(entry: &DirEntry, excludes: &[String]) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name == STATE_DIR || excludes.iter().any(|excluded| *excluded == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn keys(files: &[WalkedFile]) -> Vec<&str> {
        files.iter().map(|file| file.key.as_str()).collect()
    }

    #[test]
    fn finds_markdown_recursively_in_key_order() {
        let tmp = tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("b/deep")).unwrap();
        fs::write(tmp.path().join("z.md"), "z").unwrap();
        fs::write(tmp.path().join("b/deep/n.MD"), "n").unwrap();
        fs::write(tmp.path().join("a.md"), "a").unwrap();
        fs::write(tmp.path().join("notes.txt"), "skip").unwrap();

        let files = collect_markdown_files(tmp.path(), &[]).unwrap();
        assert_eq!(keys(&files), vec!["a.md", "b/deep/n.MD", "z.md"]);
    }

    #[test]
    fn skips_excluded_and_state_directories() {
        let tmp = tempdir().unwrap();
        for dir in [".folio", "node_modules/pkg", "docs"] {
            fs::create_dir_all(tmp.path().join(dir)).unwrap();
        }
        fs::write(tmp.path().join(".folio/cached.md"), "x").unwrap();
        fs::write(tmp.path().join("node_modules/pkg/readme.md"), "x").unwrap();
        fs::write(tmp.path().join("docs/keep.md"), "x").unwrap();

        let files = collect_markdown_files(tmp.path(), &["node_modules".to_string()]).unwrap();
        assert_eq!(keys(&files), vec!["docs/keep.md"]);
    }

    #[cfg(unix)]
    #[test]
    fn does_not_follow_symlinks() {
        use std::os::unix::fs::symlink;

        let root = tempdir().unwrap();
        let outside = tempdir().unwrap();
        fs::write(outside.path().join("outside.md"), "# outside").unwrap();
        symlink(outside.path(), root.path().join("linked-dir")).unwrap();
        symlink(outside.path().join("outside.md"), root.path().join("escape.md")).unwrap();
        fs::write(root.path().join("inside.md"), "# inside").unwrap();

        let files = collect_markdown_files(root.path(), &[]).unwrap();
        assert_eq!(keys(&files), vec!["inside.md"]);
    }

    #[test]
    fn keeps_on_disk_spelling_next_to_key() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("cafe\u{0301}.md"), "nfd").unwrap();

        let files = collect_markdown_files(tmp.path(), &[]).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].key, "caf\u{00e9}.md");
        assert_eq!(files[0].relative, "cafe\u{0301}.md");
        assert_eq!(files[0].path, tmp.path().join("cafe\u{0301}.md"));
    }

    #[test]
    fn files_sharing_a_key_are_collapsed_to_the_key_spelling() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("cafe\u{0301}.md"), "nfd").unwrap();
        fs::write(tmp.path().join("caf\u{00e9}.md"), "nfc").unwrap();
        fs::write(tmp.path().join("other.md"), "x").unwrap();

        let files = collect_markdown_files(tmp.path(), &[]).unwrap();
        // Normalization-insensitive filesystems keep a single entry anyway.
        assert_eq!(keys(&files), vec!["caf\u{00e9}.md", "other.md"]);
        assert_eq!(fs::read_to_string(&files[0].path).unwrap().len(), 3);
        if fs::read_dir(tmp.path()).unwrap().count() == 3 {
            assert_eq!(files[0].relative, "caf\u{00e9}.md");
        }
    }

    #[test]
    fn missing_root_is_not_found() {
        let tmp = tempdir().unwrap();
        let error = collect_markdown_files(&tmp.path().join("absent"), &[]).unwrap_err();
        assert!(error.is_not_found());
    }
}
