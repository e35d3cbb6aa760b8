//! shardkv - the storage core of a key-value service
//!
//! A sharded in-memory store made durable by a write-ahead log and periodic
//! snapshots:
//! - `store`: the per-shard locked key space and the `get`/`set`/`get_prefix` API
//! - `wal`: the `start`/`done` records written around every `set`
//! - `snapshot`: atomic full dumps and startup recovery
//! - `engine`: the context object tying them together
//! - `web`: an HTTP front end over the engine

pub mod config;
pub mod engine;
pub mod error;
pub mod snapshot;
pub mod store;
pub mod wal;
pub mod web;

/// Re-export commonly used types
pub use config::Config;
pub use engine::{KvEngine, RecoveryState};
pub use error::{Error, Result};
pub use snapshot::SnapshotManager;
pub use store::ShardedStore;
pub use wal::{LogRecord, Phase, SyncPolicy, WriteAheadLogger};
