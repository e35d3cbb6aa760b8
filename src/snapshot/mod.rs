//! Snapshot persistence module
//!
//! A snapshot is a timestamped full dump of the store. Together with the
//! WAL records written after its timestamp it bounds recovery time.

mod format;
mod manager;

pub use format::{read_snapshot, write_snapshot, SnapshotRecord, HEADER_LEN};
pub use manager::{LoadedSnapshot, SnapshotManager};
