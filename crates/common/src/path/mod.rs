// Workspace-relative path handling.

pub mod normalize;

pub use normalize::{
    is_markdown, normalize_path, relative_path, sanitize_path, workspace_key, PathError,
};
