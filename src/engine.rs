//! Engine context
//!
//! Owns the store, the WAL and the snapshot manager. `open` runs recovery
//! (snapshot load, then WAL replay) before the engine is handed to request
//! handlers; `shutdown` takes a final snapshot.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::snapshot::SnapshotManager;
use crate::store::{ShardStats, ShardedStore};
use crate::wal::WriteAheadLogger;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Startup progress of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryState {
    Empty,
    SnapshotLoaded,
    Recovered,
    Serving,
}

/// Engine statistics
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub state: RecoveryState,
    pub num_shards: usize,
    pub total_keys: usize,
    pub last_snapshot: u64,
    pub wal_records_appended: u64,
}

pub struct KvEngine {
    config: Config,
    store: ShardedStore,
    snapshots: SnapshotManager,
    state: RecoveryState,
}

impl KvEngine {
    /// Build the engine and recover its state from disk.
    ///
    /// Corrupt persisted data is returned as an error; the caller decides
    /// whether to abort or start over.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir).map_err(|e| Error::io(&config.data_dir, e))?;

        info!(
            "Opening store in {:?} with {} shards",
            config.data_dir, config.shard_count
        );

        let mut engine = KvEngine {
            store: ShardedStore::new(config.shard_count),
            snapshots: SnapshotManager::new(),
            state: RecoveryState::Empty,
            config,
        };
        engine.recover()?;

        Ok(engine)
    }

    fn recover(&mut self) -> Result<()> {
        let snapshot_path = self.config.snapshot_path();
        let wal_path = self.config.wal_path();

        self.snapshots.load_from_snapshot(&self.store, &snapshot_path)?;
        self.state = RecoveryState::SnapshotLoaded;

        self.snapshots.load_from_history_log(&self.store, &wal_path)?;
        self.state = RecoveryState::Recovered;

        let wal = WriteAheadLogger::open(&wal_path, self.config.sync_policy)?;
        // A clock behind the watermark must not stamp records that replay would skip
        wal.raise_floor(self.snapshots.last_snapshot());
        self.store.set_wal(Arc::new(wal));
        self.state = RecoveryState::Serving;

        info!(
            "Recovery complete: {} keys, watermark {}",
            self.store.len(),
            self.snapshots.last_snapshot()
        );
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.store.get(key)
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.store.set(key, value)
    }

    /// Best-effort prefix scan, see [`ShardedStore::get_prefix`]
    pub fn get_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.store.get_prefix(prefix)
    }

    /// Snapshot to the configured path
    pub fn snapshot(&self) -> Result<u64> {
        self.snapshot_to(self.config.snapshot_path())
    }

    pub fn snapshot_to<P: AsRef<Path>>(&self, path: P) -> Result<u64> {
        let watermark = self.snapshots.snapshot(&self.store, path)?;
        if let Some(wal) = self.store.wal() {
            wal.raise_floor(watermark);
        }
        Ok(watermark)
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    pub fn last_snapshot(&self) -> u64 {
        self.snapshots.last_snapshot()
    }

    pub fn store(&self) -> &ShardedStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            state: self.state,
            num_shards: self.store.num_shards(),
            total_keys: self.store.len(),
            last_snapshot: self.snapshots.last_snapshot(),
            wal_records_appended: self.store.wal().map(|w| w.appended()).unwrap_or(0),
        }
    }

    pub fn shard_stats(&self) -> Vec<ShardStats> {
        self.store.shard_stats()
    }

    /// Take a snapshot every `interval` until `token` is cancelled.
    ///
    /// File work runs on the blocking pool. A failed snapshot is logged and
    /// the next tick tries again.
    pub async fn run_snapshot_loop(self: Arc<Self>, interval: Duration, token: CancellationToken) {
        info!("Periodic snapshots every {:?}", interval);
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; recovery just ran
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Snapshot loop stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let engine = self.clone();
                    match tokio::task::spawn_blocking(move || engine.snapshot()).await {
                        Ok(Ok(timestamp)) => debug!("Periodic snapshot at {}", timestamp),
                        Ok(Err(e)) => error!("Periodic snapshot failed: {}", e),
                        Err(e) => error!("Snapshot task failed: {}", e),
                    }
                }
            }
        }
    }

    /// Final snapshot and WAL sync
    pub fn shutdown(&self) -> Result<u64> {
        info!("Shutting down, taking final snapshot");
        let timestamp = self.snapshot()?;
        if let Some(wal) = self.store.wal() {
            wal.sync()?;
        }
        Ok(timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config_in(dir: &Path) -> Config {
        Config {
            data_dir: dir.to_path_buf(),
            shard_count: 8,
            ..Config::default()
        }
    }

    #[test]
    fn test_open_empty() {
        let dir = tempfile::tempdir().unwrap();
        let engine = KvEngine::open(config_in(dir.path())).unwrap();

        assert_eq!(engine.state(), RecoveryState::Serving);
        assert!(engine.store().is_empty());
        assert_eq!(engine.last_snapshot(), 0);
        assert_eq!(engine.get("x"), None);
    }

    #[test]
    fn test_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir: PathBuf = dir.path().join("nested").join("data");

        let engine = KvEngine::open(config_in(&data_dir)).unwrap();
        engine.set("k", "v").unwrap();

        assert!(data_dir.join("history.log").exists());
    }

    #[test]
    fn test_writes_survive_restart_via_wal() {
        let dir = tempfile::tempdir().unwrap();
        {
            let engine = KvEngine::open(config_in(dir.path())).unwrap();
            engine.set("a", "1").unwrap();
            engine.set("b", "2").unwrap();
            engine.set("a", "3").unwrap();
        }

        let engine = KvEngine::open(config_in(dir.path())).unwrap();
        assert_eq!(engine.get("a").as_deref(), Some("3"));
        assert_eq!(engine.get("b").as_deref(), Some("2"));
    }

    #[test]
    fn test_snapshot_then_wal_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let engine = KvEngine::open(config_in(dir.path())).unwrap();
            engine.set("before", "1").unwrap();
            engine.snapshot().unwrap();
            engine.set("after", "2").unwrap();
        }

        let engine = KvEngine::open(config_in(dir.path())).unwrap();
        assert!(engine.last_snapshot() > 0);
        assert_eq!(engine.get("before").as_deref(), Some("1"));
        assert_eq!(engine.get("after").as_deref(), Some("2"));
    }

    #[test]
    fn test_shard_count_change_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        {
            let engine = KvEngine::open(config_in(dir.path())).unwrap();
            for i in 0..50 {
                engine.set(format!("k{}", i), i.to_string()).unwrap();
            }
            engine.shutdown().unwrap();
        }

        let mut config = config_in(dir.path());
        config.shard_count = 3;
        let engine = KvEngine::open(config).unwrap();

        assert_eq!(engine.store().num_shards(), 3);
        for i in 0..50 {
            assert_eq!(engine.get(&format!("k{}", i)), Some(i.to_string()));
        }
    }

    #[test]
    fn test_corrupt_wal_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        fs::write(config.wal_path(), "10,a,1,start\nnot a record\n10,b,2,start\n").unwrap();

        let err = KvEngine::open(config).err().unwrap();
        assert!(matches!(err, Error::MalformedLog { .. }));
    }

    #[test]
    fn test_corrupt_snapshot_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        fs::write(config.snapshot_path(), "1700000000{oops").unwrap();

        let err = KvEngine::open(config).err().unwrap();
        assert!(matches!(err, Error::MalformedSnapshot { .. }));
    }

    #[test]
    fn test_write_after_future_watermark_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        // Snapshot taken while the clock was an hour ahead
        let watermark = crate::wal::unix_timestamp() + 3600;
        std::fs::write(config.snapshot_path(), format!("{:010}[]", watermark)).unwrap();

        {
            let engine = KvEngine::open(config.clone()).unwrap();
            assert_eq!(engine.last_snapshot(), watermark);
            engine.set("x", "9").unwrap();
        }

        let engine = KvEngine::open(config).unwrap();
        assert_eq!(engine.get("x").as_deref(), Some("9"));
    }

    #[test]
    fn test_stats() {
        let dir = tempfile::tempdir().unwrap();
        let engine = KvEngine::open(config_in(dir.path())).unwrap();
        engine.set("a", "1").unwrap();

        let stats = engine.stats();
        assert_eq!(stats.state, RecoveryState::Serving);
        assert_eq!(stats.num_shards, 8);
        assert_eq!(stats.total_keys, 1);
        assert_eq!(stats.wal_records_appended, 2);
        assert_eq!(engine.shard_stats().len(), 8);
    }

    #[tokio::test]
    async fn test_snapshot_loop_writes_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(KvEngine::open(config_in(dir.path())).unwrap());
        engine.set("k", "v").unwrap();

        let token = CancellationToken::new();
        let handle = tokio::spawn(
            engine
                .clone()
                .run_snapshot_loop(Duration::from_millis(20), token.clone()),
        );

        let snapshot_path = engine.config().snapshot_path();
        for _ in 0..100 {
            if snapshot_path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        token.cancel();
        handle.await.unwrap();

        assert!(snapshot_path.exists());
        assert!(engine.last_snapshot() > 0);
    }
}
