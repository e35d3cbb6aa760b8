//! In-memory storage module
//!
//! The key space is split across a fixed array of shards, each with its own
//! reader/writer lock. This module knows nothing about snapshots; it only
//! logs writes through an attached WAL.

mod router;
mod shard;
mod sharded;

pub use router::ShardRouter;
pub use shard::Shard;
pub use sharded::{ShardStats, ShardedStore, DEFAULT_SHARDS};
