// Persistence: record store, content-addressed blobs, version chains,
// snapshots.

pub mod atomic;
pub mod content;
pub mod records;
pub mod snapshot;
pub mod versions;
