use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::security::{ensure_owner_only_file, open_private_truncate};

/// Write `bytes` to `target` so readers see either the old file or the
/// complete new one: temp file in the same directory, fsync, rename.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp_path = temp_path_for(target);
    let result = write_then_rename(&tmp_path, target, bytes);
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn write_then_rename(tmp_path: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = open_private_truncate(tmp_path)?;
    file.write_all(bytes)?;
    file.sync_data()?;
    drop(file);

    fs::rename(tmp_path, target)?;
    ensure_owner_only_file(target)
}

fn temp_path_for(target: &Path) -> PathBuf {
    let name = target.file_name().map(|name| name.to_string_lossy()).unwrap_or_default();
    target.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()))
}
