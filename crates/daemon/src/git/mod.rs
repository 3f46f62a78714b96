// VCS metadata capture for snapshots.

pub mod probe;
