// folio-daemon: storage engine, indexer and change watcher for a workspace.

pub mod config;
pub mod error;
pub mod git;
pub mod index;
pub mod runtime;
pub mod security;
pub mod store;
pub mod watcher;
pub mod workspace;
