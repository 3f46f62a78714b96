// Workspace keys: NFKC normalization, traversal rejection, 512 char max.
//
// Every path the engine stores (version index, scan manifest, snapshot
// manifest) is a key produced here, so two spellings of the same file always
// collapse to one record. Paths that must still name a file on disk go
// through `sanitize_path`, which skips the Unicode normalization.

use std::path::{Component, Path};

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Maximum allowed key length in characters.
const MAX_PATH_CHARS: usize = 512;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path exceeds maximum length of {MAX_PATH_CHARS} characters")]
    TooLong,

    #[error("path contains directory traversal component: {0}")]
    Traversal(String),

    #[error("path contains null byte")]
    NullByte,

    #[error("path contains invalid component: {0}")]
    InvalidComponent(String),

    #[error("path `{0}` is outside the workspace root")]
    OutsideRoot(String),
}

impl PathError {
    /// True for errors that mean the caller tried to escape the workspace.
    pub fn is_traversal(&self) -> bool {
        matches!(self, Self::Traversal(_) | Self::OutsideRoot(_))
    }
}

/// Normalize a workspace-relative path into its storage key.
///
/// - Unicode NFKC normalization
/// - everything [`sanitize_path`] does
pub fn normalize_path(input: &str) -> Result<String, PathError> {
    sanitize_path(&input.nfkc().collect::<String>())
}

/// Validate a relative path without touching its Unicode spelling, so the
/// result still names the file on disk.
///
/// - `\` becomes `/`, runs of `/` collapse, leading and trailing `/` are dropped
/// - `.` and `..` components are rejected as traversal
/// - null bytes, empty paths, whitespace-only components and paths longer
///   than 512 characters are rejected
pub fn sanitize_path(input: &str) -> Result<String, PathError> {
    if input.contains('\0') {
        return Err(PathError::NullByte);
    }

    let unified = input.replace('\\', "/");
    let components: Vec<&str> = unified.split('/').filter(|s| !s.is_empty()).collect();
    if components.is_empty() {
        return Err(PathError::Empty);
    }

    for component in &components {
        check_component(component)?;
    }

    let path = components.join("/");
    if path.chars().count() > MAX_PATH_CHARS {
        return Err(PathError::TooLong);
    }
    Ok(path)
}

/// The path of `path` relative to `root`, spelled exactly as on disk.
///
/// Both paths are compared lexically; callers that care about symlinks must
/// canonicalize first (the file watcher does).
pub fn relative_path(root: &Path, path: &Path) -> Result<String, PathError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| PathError::OutsideRoot(path.display().to_string()))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(part) => parts.push(part),
                None => {
                    return Err(PathError::InvalidComponent(part.to_string_lossy().into_owned()))
                }
            },
            Component::CurDir => return Err(PathError::Traversal(".".to_string())),
            Component::ParentDir => return Err(PathError::Traversal("..".to_string())),
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::OutsideRoot(path.display().to_string()))
            }
        }
    }

    sanitize_path(&parts.join("/"))
}

/// Convert an absolute path inside `root` into its workspace key.
pub fn workspace_key(root: &Path, path: &Path) -> Result<String, PathError> {
    normalize_path(&relative_path(root, path)?)
}

/// Returns true if the path has an `.md` extension (case-insensitive).
pub fn is_markdown(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()).is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
}

fn check_component(component: &str) -> Result<(), PathError> {
    match component {
        "." | ".." => Err(PathError::Traversal(component.to_string())),
        _ if component.trim().is_empty() => {
            Err(PathError::InvalidComponent("(whitespace-only component)".to_string()))
        }
        _ => Ok(()),
    }
}
