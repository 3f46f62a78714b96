use std::fs;
use std::path::Path;

use folio_common::anchor::AnchorTarget;
use folio_common::path::{normalize_path, PathError};
use folio_daemon::config::WorkspaceConfig;
use folio_daemon::error::StoreError;
use folio_daemon::store::snapshot::RestoreTarget;
use folio_daemon::workspace::{Workspace, WorkspacePaths};
use folio_common::types::VersionSource;

fn open(root: &Path) -> Workspace {
    let mut config = WorkspaceConfig::default();
    config.snapshots.capture_git = false;
    Workspace::open_with_config(WorkspacePaths::resolve(root).expect("root resolves"), config)
        .expect("workspace opens")
}

#[test]
fn rejects_parent_directory_traversal_sequences() {
    assert_eq!(normalize_path("../../../etc/passwd"), Err(PathError::Traversal("..".to_string())));
    assert_eq!(normalize_path("docs/../secrets.md"), Err(PathError::Traversal("..".to_string())));
}

#[test]
fn rejects_null_bytes_and_overlong_paths() {
    assert_eq!(normalize_path("docs/file\0.md"), Err(PathError::NullByte));
    assert_eq!(normalize_path(&"a".repeat(513)), Err(PathError::TooLong));
}

#[test]
fn unicode_equivalents_share_version_history() {
    let tmp = tempfile::tempdir().unwrap();
    let workspace = open(tmp.path());
    let versions = workspace.versions();

    versions.create_version("docs/caf\u{0065}\u{0301}.md", b"one", VersionSource::Auto).unwrap();
    versions.create_version("docs/café.md", b"two", VersionSource::Auto).unwrap();
    assert_eq!(versions.list_files().len(), 1);
    assert_eq!(versions.list_versions("docs/café.md").unwrap().len(), 2);
}

#[test]
fn version_store_rejects_escaping_paths() {
    let tmp = tempfile::tempdir().unwrap();
    let workspace = open(tmp.path());

    let error = workspace
        .versions()
        .create_version("../escape.md", b"x", VersionSource::Manual)
        .unwrap_err();
    assert!(matches!(error, StoreError::PathTraversal { .. }), "got {error:?}");
    assert!(workspace.versions().list_files().is_empty());
}

#[test]
fn anchor_resolution_cannot_read_outside_root() {
    let tmp = tempfile::tempdir().unwrap();
    let workspace = open(tmp.path());

    let error = workspace.resolve_anchor("../../etc/passwd", &AnchorTarget::File).unwrap_err();
    assert!(matches!(error, StoreError::PathTraversal { .. }), "got {error:?}");
}

#[test]
fn forged_snapshot_entry_is_not_restored_outside_root() {
    let parent = tempfile::tempdir().unwrap();
    let root = parent.path().join("ws");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("doc.md"), "# Doc\n").unwrap();
    let workspace = open(&root);
    let snapshot = workspace.snapshots().create("base", "").unwrap();

    let record_path = root.join(".folio/records/snapshots").join(format!("{}.json", snapshot.id));
    let forged = fs::read_to_string(&record_path).unwrap().replace("\"doc.md\"", "\"../evil.md\"");
    fs::write(&record_path, forged).unwrap();

    let report = workspace.snapshots().restore(&snapshot.id, &RestoreTarget::Overwrite).unwrap();
    assert_eq!(report.restored_count, 0);
    assert_eq!(report.errors.len(), 1);
    assert!(!parent.path().join("evil.md").exists());
}

#[cfg(unix)]
#[test]
fn snapshots_do_not_follow_symlinks_out_of_the_workspace() {
    use std::os::unix::fs::symlink;

    let workspace_root = tempfile::tempdir().unwrap();
    let outside_root = tempfile::tempdir().unwrap();
    fs::write(outside_root.path().join("outside.md"), "# outside").unwrap();
    fs::write(workspace_root.path().join("inside.md"), "# inside").unwrap();
    let outside_file = outside_root.path().join("outside.md");
    symlink(outside_file, workspace_root.path().join("escape.md")).unwrap();
    symlink(outside_root.path(), workspace_root.path().join("linked-dir")).unwrap();

    let workspace = open(workspace_root.path());
    let snapshot = workspace.snapshots().create("scan", "").unwrap();

    let captured: Vec<&str> =
        snapshot.file_manifest.iter().map(|entry| entry.file_path.as_str()).collect();
    assert_eq!(captured, vec!["inside.md"]);
}

#[cfg(unix)]
#[test]
fn restore_refuses_to_write_through_symlinked_directory() {
    use std::os::unix::fs::symlink;

    let workspace_root = tempfile::tempdir().unwrap();
    let outside_root = tempfile::tempdir().unwrap();
    fs::create_dir_all(workspace_root.path().join("docs")).unwrap();
    fs::write(workspace_root.path().join("docs/guide.md"), "# Guide").unwrap();

    let workspace = open(workspace_root.path());
    let snapshot = workspace.snapshots().create("base", "").unwrap();

    fs::remove_dir_all(workspace_root.path().join("docs")).unwrap();
    symlink(outside_root.path(), workspace_root.path().join("docs")).unwrap();

    let report = workspace.snapshots().restore(&snapshot.id, &RestoreTarget::Overwrite).unwrap();
    assert_eq!(report.restored_count, 0);
    assert_eq!(report.errors.len(), 1);
    assert!(!outside_root.path().join("guide.md").exists());
}
