//! Write-ahead log (WAL) module
//!
//! Every `Set` is bracketed by a `start` record, appended before the
//! in-memory apply, and a `done` record, appended after it. On restart the
//! `start` records written since the last snapshot are replayed.

mod reader;
mod record;
mod replay;
mod writer;

pub use reader::{ParsedLog, WalReader};
pub use record::{unix_timestamp, LogRecord, Phase};
pub use replay::{replay_records, ReplayStats};
pub use writer::WriteAheadLogger;

use serde::Deserialize;

/// WAL sync policy
///
/// Only `Always` guarantees that an acknowledged `Set` survives a crash.
/// The other two trade that guarantee for throughput.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// Sync after every append
    #[default]
    Always,
    /// Sync at most once per second
    EverySecond,
    /// Let the OS decide when to sync
    No,
}
