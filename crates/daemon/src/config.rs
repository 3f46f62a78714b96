// Local configuration files.
//
// Global config: `~/.folio/config.toml`
// Workspace config: `<workspace>/.folio/workspace.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::index::walk::STATE_DIR;
use crate::security::create_private_dir_all;
use crate::store::atomic::write_atomic;
use crate::watcher::debounce::DebounceConfig;
use crate::watcher::pipeline::{RetentionPolicy, WatcherConfig};

/// Root directory for global state: `~/.folio/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(STATE_DIR))
}

/// Path to the global config file: `~/.folio/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

/// Path to the workspace config file: `<root>/.folio/workspace.toml`.
pub fn workspace_config_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(STATE_DIR).join("workspace.toml")
}

// ── Global config ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
    /// Workspace opened when `foliod` is started without a root.
    pub default_workspace: Option<PathBuf>,
}

impl GlobalConfig {
    /// Load from `~/.folio/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        save_toml(self, path)
    }
}

// ── Workspace config ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub versioning: VersioningConfig,
    pub index: IndexConfig,
    pub snapshots: SnapshotsConfig,
}

impl WorkspaceConfig {
    /// Load from `<root>/.folio/workspace.toml`. A missing file yields the
    /// defaults; a malformed one is an error.
    pub fn load(workspace_root: &Path) -> Result<Self, ConfigError> {
        match Self::load_from(&workspace_config_path(workspace_root)) {
            Err(ConfigError::Io(error)) if error.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to `<root>/.folio/workspace.toml`.
    pub fn save(&self, workspace_root: &Path) -> Result<(), ConfigError> {
        self.save_to(&workspace_config_path(workspace_root))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        save_toml(self, path)
    }

    /// Settings for the auto-versioning watcher.
    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            debounce: self.versioning.debounce(),
            retention: self.versioning.retention(),
            excludes: self.index.exclude.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VersioningConfig {
    /// Version files automatically as they change.
    pub auto_version: bool,
    /// Quiet period before a change is versioned. Clamped to 50..=60000.
    pub debounce_ms: u64,
    /// Versions kept per file; `0` keeps every version.
    pub max_versions: usize,
    /// Drop versions older than this many days (latest always kept).
    pub retention_days: Option<u32>,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self { auto_version: true, debounce_ms: 1_000, max_versions: 50, retention_days: None }
    }
}

impl VersioningConfig {
    pub fn debounce(&self) -> DebounceConfig {
        DebounceConfig::with_millis(self.debounce_ms)
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_versions: (self.max_versions > 0).then_some(self.max_versions),
            retention_days: self.retention_days,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory names skipped when walking the tree. The state directory
    /// is always skipped.
    pub exclude: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { exclude: vec![".git".into(), "node_modules".into()] }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SnapshotsConfig {
    /// Record git HEAD, branch and dirty state on snapshots.
    pub capture_git: bool,
}

impl Default for SnapshotsConfig {
    fn default() -> Self {
        Self { capture_git: true }
    }
}

fn save_toml<T: Serialize>(value: &T, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        create_private_dir_all(parent).map_err(ConfigError::Io)?;
    }
    let contents = toml::to_string_pretty(value).map_err(ConfigError::Serialize)?;
    write_atomic(path, contents.as_bytes()).map_err(ConfigError::Io)
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
