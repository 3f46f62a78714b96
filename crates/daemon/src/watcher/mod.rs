// Change watcher: notify → filter → per-path debounce → auto-version.
// This module is the first stage: OS events mapped to markdown file events.

pub mod debounce;
pub mod pipeline;

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use folio_common::path::is_markdown;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::index::walk::STATE_DIR;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    /// Created, or renamed into place.
    Create,
    Modify,
    /// Deleted, or renamed away.
    Remove,
}

/// A filesystem event for a single markdown file inside the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
}

const EVENT_CHANNEL_CAPACITY: usize = 512;

/// Decides which paths under the root produce events.
#[derive(Debug, Clone)]
pub struct EventFilter {
    root: PathBuf,
    excluded_dirs: Vec<String>,
}

impl EventFilter {
    pub fn new(root: impl Into<PathBuf>, excluded_dirs: Vec<String>) -> Self {
        Self { root: root.into(), excluded_dirs }
    }

    /// Markdown, inside the root, not under the state directory or an
    /// excluded directory.
    pub fn accepts(&self, path: &Path) -> bool {
        if !is_markdown(path) {
            return false;
        }
        let Ok(relative) = path.strip_prefix(&self.root) else {
            warn!(path = %path.display(), "ignoring event outside watch root");
            return false;
        };
        let mut parent_components = relative.parent().into_iter().flat_map(Path::components);
        !parent_components.any(|component| match component {
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                name == STATE_DIR || self.excluded_dirs.iter().any(|excluded| *excluded == name)
            }
            _ => true,
        })
    }
}

/// OS-native recursive watcher (inotify, fsevents, ...) over a workspace.
///
/// Dropping the handle stops the OS watch and closes the event channel.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    pub fn start(
        root: &Path,
        excluded_dirs: Vec<String>,
    ) -> Result<(Self, mpsc::Receiver<RawFsEvent>)> {
        let root = root
            .canonicalize()
            .with_context(|| format!("failed to canonicalize watch root: {}", root.display()))?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let filter = EventFilter::new(root.clone(), excluded_dirs);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for raw in translate_event(&event, &filter) {
                    if tx.blocking_send(raw).is_err() {
                        debug!("event channel closed, stopping event dispatch");
                        return;
                    }
                }
            }
            Err(e) => error!(error = %e, "file watcher error"),
        })
        .context("failed to create file watcher")?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch directory: {}", root.display()))?;

        debug!(path = %root.display(), "file watcher started");
        Ok((Self { _watcher: watcher, root }, rx))
    }

    /// The canonicalized root directory being watched.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Map one notify event onto zero or more markdown file events.
///
/// Renames become a remove of the old path and a create of the new one.
/// Metadata-only and access events are dropped.
pub fn translate_event(event: &Event, filter: &EventFilter) -> Vec<RawFsEvent> {
    let kinds: Vec<(FsEventKind, &PathBuf)> = match &event.kind {
        EventKind::Create(_) => event.paths.iter().map(|p| (FsEventKind::Create, p)).collect(),
        EventKind::Remove(_) => event.paths.iter().map(|p| (FsEventKind::Remove, p)).collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => {
            trace!("skipping metadata-only modify event");
            Vec::new()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.iter().map(|p| (FsEventKind::Remove, p)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.iter().map(|p| (FsEventKind::Create, p)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![(FsEventKind::Remove, from), (FsEventKind::Create, to)],
            other => other.iter().map(|p| (FsEventKind::Modify, p)).collect(),
        },
        EventKind::Modify(_) => event.paths.iter().map(|p| (FsEventKind::Modify, p)).collect(),
        _ => {
            trace!(kind = ?event.kind, "skipping non-content event");
            Vec::new()
        }
    };

    kinds
        .into_iter()
        .filter(|(_, path)| filter.accepts(path))
        .map(|(kind, path)| RawFsEvent { kind, path: path.clone() })
        .collect()
}
