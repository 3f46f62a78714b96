use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::watcher::pipeline::WatcherEvent;
use crate::workspace::Workspace;

/// Open the workspace at `root`, index it, and auto-version changes until
/// Ctrl-C.
pub async fn run_standalone(root: PathBuf) -> Result<()> {
    let workspace = tokio::task::spawn_blocking(move || Workspace::open(&root))
        .await
        .context("workspace open task panicked")??;
    let workspace = Arc::new(workspace);

    rescan(&workspace).await?;

    if !workspace.config().versioning.auto_version {
        info!(root = %workspace.root().display(), "auto-versioning disabled, waiting for shutdown");
        tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
        return Ok(());
    }

    let (watcher, events) = workspace.start_watcher()?;
    info!(root = %workspace.root().display(), "folio daemon running");

    let result = tokio::select! {
        result = pump_events(&workspace, events) => result,
        signal = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            signal.context("failed to listen for Ctrl-C")
        }
    };

    watcher.stop().await;
    result
}

/// Re-index after each new version so the section metadata stays current.
async fn pump_events(
    workspace: &Arc<Workspace>,
    mut events: mpsc::Receiver<WatcherEvent>,
) -> Result<()> {
    while let Some(event) = events.recv().await {
        match event {
            WatcherEvent::VersionCreated { file_path, version_id } => {
                info!(path = %file_path, version_id = %version_id, "version created");
                if let Err(error) = rescan(workspace).await {
                    warn!(error = %error, "re-index after version failed");
                }
            }
            WatcherEvent::VersionError { file_path, message } => {
                warn!(path = %file_path, error = %message, "version failed");
            }
        }
    }
    debug!("watcher event channel closed");
    Ok(())
}

async fn rescan(workspace: &Arc<Workspace>) -> Result<()> {
    let workspace = Arc::clone(workspace);
    let outcome = tokio::task::spawn_blocking(move || workspace.indexer().scan_incremental())
        .await
        .context("index scan task panicked")?
        .context("index scan failed")?;

    let stats = outcome.stats;
    debug!(
        files = outcome.files.len(),
        unchanged = stats.unchanged,
        rehashed = stats.rehashed,
        parsed = stats.parsed,
        removed = stats.removed,
        "index scan complete"
    );
    Ok(())
}
