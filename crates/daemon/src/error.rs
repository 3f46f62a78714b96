// Typed storage errors surfaced by the content, version and snapshot stores.
//
// Orchestration code (runtime, watcher wiring, CLI) wraps these in anyhow.

use std::path::PathBuf;

use folio_common::path::PathError;
use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} `{id}` not found")]
    NotFound { kind: &'static str, id: String },

    #[error("path `{path}` escapes the workspace root")]
    PathTraversal { path: String },

    #[error("invalid workspace path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("content blob `{hash}` is missing")]
    ContentMissing { hash: String },

    #[error("content blob `{hash}` failed verification at {path}")]
    CorruptBlob { hash: String, path: PathBuf },

    #[error("corrupt {what} at {path}: {reason}")]
    CorruptIndex { what: &'static str, path: PathBuf, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn corrupt(what: &'static str, path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CorruptIndex { what, path: path.into(), reason: reason.to_string() }
    }

    /// Map a path validation failure, singling out workspace escapes.
    pub fn from_path_error(input: &str, error: PathError) -> Self {
        if error.is_traversal() {
            Self::PathTraversal { path: input.to_string() }
        } else {
            Self::InvalidPath(error)
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Attach a path to a raw I/O result.
pub(crate) trait IoContext<T> {
    fn at(self, path: impl Into<PathBuf>) -> StoreResult<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: impl Into<PathBuf>) -> StoreResult<T> {
        self.map_err(|source| StoreError::io(path, source))
    }
}
