// Filesystem hardening for the `.folio` state directory and path confinement
// for anything written back into the workspace.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use folio_common::path::sanitize_path;

use crate::error::{StoreError, StoreResult};

pub fn ensure_owner_only_file(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if !path.exists() {
            return Ok(());
        }

        let mode = fs::metadata(path)?.permissions().mode() & 0o777;
        if mode != 0o600 {
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
    }

    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}

pub fn ensure_owner_only_dir(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if !path.exists() {
            return Ok(());
        }

        let mode = fs::metadata(path)?.permissions().mode() & 0o777;
        if mode != 0o700 {
            fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
        }
    }

    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}

/// `create_dir_all` followed by tightening the leaf to owner-only.
pub fn create_private_dir_all(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)?;
    ensure_owner_only_dir(path)
}

pub fn open_private_truncate(path: &Path) -> io::Result<fs::File> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;

        OpenOptions::new().create(true).write(true).truncate(true).mode(0o600).open(path)
    }
    #[cfg(not(unix))]
    {
        OpenOptions::new().create(true).write(true).truncate(true).open(path)
    }
}

/// Join a workspace-relative path onto `root`, refusing anything that would
/// land outside it.
///
/// The relative path is sanitized first, which rejects `..` and `.`
/// components but keeps its Unicode spelling so it names the file on disk.
/// If the deepest existing ancestor of the target resolves (via
/// symlinks) to somewhere outside the canonical root, the path is rejected
/// as well.
pub fn resolve_within_root(root: &Path, relative: &str) -> StoreResult<PathBuf> {
    let key =
        sanitize_path(relative).map_err(|error| StoreError::from_path_error(relative, error))?;
    let target = key.split('/').fold(root.to_path_buf(), |path, part| path.join(part));

    let canonical_root = match root.canonicalize() {
        Ok(path) => path,
        // A missing root cannot contain symlinks yet.
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(target),
        Err(error) => return Err(StoreError::io(root, error)),
    };

    let mut probe = target.as_path();
    loop {
        match probe.canonicalize() {
            Ok(resolved) => {
                if !resolved.starts_with(&canonical_root) {
                    return Err(StoreError::PathTraversal { path: relative.to_string() });
                }
                break;
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => match probe.parent() {
                Some(parent) if parent.starts_with(root) => probe = parent,
                _ => break,
            },
            Err(error) => return Err(StoreError::io(probe, error)),
        }
    }

    Ok(target)
}
