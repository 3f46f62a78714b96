// foliod: watches a workspace and versions markdown files as they change.

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;
use folio_daemon::config::GlobalConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "foliod", version, about = "Versioned workspace daemon")]
struct Args {
    /// Workspace root. Defaults to `default_workspace` from
    /// `~/.folio/config.toml`, then the current directory.
    root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let global = GlobalConfig::load();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(global.log_filter.as_deref().unwrap_or("info")))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let root = match args.root.or(global.default_workspace) {
        Some(root) => root,
        None => std::env::current_dir().map_err(|error| anyhow!("no workspace root: {error}"))?,
    };

    info!(root = %root.display(), "starting folio daemon");
    folio_daemon::runtime::run_standalone(root)
        .await
        .context("folio daemon terminated unexpectedly")
}
