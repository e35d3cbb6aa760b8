//! WAL replay
//!
//! Re-applies `start` records to a store. Each `start` marks an attempted
//! write, and applying a `(key, value)` pair is idempotent, so a write that
//! crashed before its `done` record is simply re-issued.

use super::{LogRecord, Phase};
use crate::store::ShardedStore;
use tracing::{debug, info};

/// Counters from one replay pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// `start` records applied to the store
    pub replayed: usize,
    /// `start` records older than the watermark
    pub skipped: usize,
    /// `done` records seen
    pub completed: usize,
}

/// Replay `records` into `store`, ignoring writes older than `watermark`
/// (Unix seconds of the last snapshot; 0 replays everything).
pub fn replay_records(store: &ShardedStore, records: &[LogRecord], watermark: u64) -> ReplayStats {
    let mut stats = ReplayStats::default();

    for record in records {
        match record.phase {
            Phase::Done => stats.completed += 1,
            Phase::Start if record.timestamp < watermark => stats.skipped += 1,
            Phase::Start => {
                debug!("Recover: {} {}", record.key, record.value);
                store.apply(record.key.clone(), record.value.clone());
                stats.replayed += 1;
            }
        }
    }

    info!(
        "Replayed {} WAL records ({} before watermark {}, {} completions)",
        stats.replayed, stats.skipped, watermark, stats.completed
    );
    stats
}
