//! Sharded store
//!
//! A fixed array of independently locked shards. Keys are routed to
//! `hash(key) mod M`; writes on different shards never block each other.

use super::router::ShardRouter;
use super::shard::{self, Shard};
use crate::error::{Error, Result};
use crate::wal::{Phase, WriteAheadLogger};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Default number of shards
pub const DEFAULT_SHARDS: usize = 32;

/// The in-memory store
pub struct ShardedStore {
    shards: Vec<Shard>,
    router: ShardRouter,
    wal: Option<Arc<WriteAheadLogger>>,
}

impl ShardedStore {
    /// Create an empty store with `num_shards` shards.
    ///
    /// # Panics
    ///
    /// Panics if `num_shards` is 0. [`Config::validate`](crate::Config::validate)
    /// rejects that value before the engine gets here.
    pub fn new(num_shards: usize) -> Self {
        let router = ShardRouter::new(num_shards);
        let shards = (0..num_shards).map(|_| Shard::new()).collect();

        ShardedStore {
            shards,
            router,
            wal: None,
        }
    }

    /// Attach the WAL. From then on every `set` is logged.
    pub fn set_wal(&mut self, wal: Arc<WriteAheadLogger>) {
        self.wal = Some(wal);
    }

    pub fn wal(&self) -> Option<&Arc<WriteAheadLogger>> {
        self.wal.as_ref()
    }

    /// Index of the shard owning `key`
    pub fn shard_index(&self, key: &str) -> usize {
        self.router.route(key)
    }

    fn shard_for(&self, key: &str) -> &Shard {
        &self.shards[self.router.route(key)]
    }

    /// Look up a key
    pub fn get(&self, key: &str) -> Option<String> {
        let value = self.shard_for(key).get(key);
        debug!("Get key: {} (found: {})", key, value.is_some());
        value
    }

    /// Insert or overwrite a key.
    ///
    /// With a WAL attached, the `start` record is durable before the value
    /// becomes visible and `done` is appended afterwards. The shard write
    /// lock is held across the `start` append and the apply, so for any one
    /// key the log order matches the order in which values were applied.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        let value = value.into();
        debug!("Set key: {}, value: {}", key, value);

        let wal = match &self.wal {
            Some(wal) => wal,
            None => {
                self.apply(key, value);
                return Ok(());
            }
        };

        let shard = self.shard_for(&key);
        {
            let mut map = shard.write();
            wal.append(Phase::Start, &key, &value)?;
            map.insert(key.clone(), value.clone());
        }
        wal.append(Phase::Done, &key, &value)
    }

    /// Insert without logging. Used for snapshot load and WAL replay, whose
    /// records are already durable.
    pub fn apply(&self, key: String, value: String) {
        self.shard_for(&key).insert(key, value);
    }

    /// Values of every key starting with `prefix`.
    ///
    /// Shards are scanned one at a time, each under its own read lock. The
    /// result is not an atomic view of the store: a write racing with the
    /// scan may be seen in one shard and missed in another. Use
    /// [`get_prefix_consistent`](Self::get_prefix_consistent) for an atomic
    /// view at the cost of stalling all writers during the scan.
    pub fn get_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut values = Vec::new();
        for shard in &self.shards {
            shard.collect_prefix(prefix, &mut values);
        }

        debug!("Get prefix: {} ({} values)", prefix, values.len());
        Self::non_empty(prefix, values)
    }

    /// Like [`get_prefix`](Self::get_prefix) but holds every shard read lock
    /// for the whole scan. Locks are taken in index order; writers only ever
    /// hold one shard lock, so this cannot deadlock.
    pub fn get_prefix_consistent(&self, prefix: &str) -> Result<Vec<String>> {
        let guards: Vec<_> = self.shards.iter().map(|s| s.read()).collect();

        let mut values = Vec::new();
        for map in &guards {
            shard::collect_prefix(map, prefix, &mut values);
        }
        drop(guards);

        Self::non_empty(prefix, values)
    }

    fn non_empty(prefix: &str, values: Vec<String>) -> Result<Vec<String>> {
        if values.is_empty() {
            Err(Error::NotFound(prefix.to_string()))
        } else {
            Ok(values)
        }
    }

    /// Copy of every `(key, value)` pair, shard by shard (not atomic)
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::with_capacity(self.len());
        for shard in &self.shards {
            shard.collect_entries(&mut out);
        }
        out
    }

    /// Total number of keys
    pub fn len(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(Shard::is_empty)
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Key count per shard
    pub fn shard_stats(&self) -> Vec<ShardStats> {
        self.shards
            .iter()
            .enumerate()
            .map(|(shard_id, shard)| ShardStats {
                shard_id,
                keys: shard.len(),
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn entries_sorted(&self) -> Vec<(String, String)> {
        let mut entries = self.entries();
        entries.sort();
        entries
    }

    #[cfg(test)]
    pub(crate) fn shard(&self, index: usize) -> &Shard {
        &self.shards[index]
    }
}

impl Default for ShardedStore {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

/// Statistics for a single shard
#[derive(Debug, Clone, Serialize)]
pub struct ShardStats {
    pub shard_id: usize,
    pub keys: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::{SyncPolicy, WalReader};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    #[should_panic(expected = "Number of shards must be > 0")]
    fn test_zero_shards_panics() {
        let _ = ShardedStore::new(0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_set_reports_wal_write_failure() {
        let mut store = ShardedStore::new(4);
        let wal = WriteAheadLogger::open("/dev/full", SyncPolicy::Always).unwrap();
        store.set_wal(Arc::new(wal));

        let err = store.set("k", "v").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        // Not logged, so not applied
        assert_eq!(store.get("k"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_set_then_get() {
        let store = ShardedStore::default();
        store.set("key1", "value1").unwrap();

        assert_eq!(store.get("key1").as_deref(), Some("value1"));
        assert_eq!(store.get("never_set"), None);
    }

    #[test]
    fn test_overwrite() {
        let store = ShardedStore::new(4);
        store.set("k", "v1").unwrap();
        store.set("k", "v2").unwrap();

        assert_eq!(store.get("k").as_deref(), Some("v2"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_keys_live_in_exactly_one_shard() {
        let store = ShardedStore::new(8);
        for i in 0..100 {
            store.set(format!("key_{}", i), i.to_string()).unwrap();
        }

        assert_eq!(store.len(), 100);
        for i in 0..100 {
            let key = format!("key_{}", i);
            let owner = store.shard_index(&key);
            for idx in 0..store.num_shards() {
                assert_eq!(store.shard(idx).get(&key).is_some(), idx == owner);
            }
        }
    }

    #[test]
    fn test_get_prefix() {
        let store = ShardedStore::default();
        store.set("a", "1").unwrap();
        store.set("ab", "2").unwrap();
        store.set("b", "3").unwrap();

        let mut values = store.get_prefix("a").unwrap();
        values.sort();
        assert_eq!(values, vec!["1".to_string(), "2".to_string()]);

        assert!(store.get_prefix("z").unwrap_err().is_not_found());
    }

    #[test]
    fn test_get_prefix_consistent() {
        let store = ShardedStore::new(4);
        store.set("a", "1").unwrap();
        store.set("ab", "2").unwrap();
        store.set("b", "3").unwrap();

        let mut values = store.get_prefix_consistent("a").unwrap();
        values.sort();
        assert_eq!(values, vec!["1".to_string(), "2".to_string()]);
        assert!(store.get_prefix_consistent("z").unwrap_err().is_not_found());
    }

    #[test]
    fn test_set_is_logged_around_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.wal");

        let mut store = ShardedStore::new(4);
        store.set_wal(Arc::new(WriteAheadLogger::open(&path, SyncPolicy::Always).unwrap()));
        store.set("x", "9").unwrap();

        let parsed = WalReader::load(&path).unwrap().unwrap().parse_records().unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].phase, Phase::Start);
        assert_eq!(parsed.records[1].phase, Phase::Done);
        assert_eq!(parsed.records[0].key, "x");
        assert_eq!(parsed.records[0].value, "9");
    }

    #[test]
    fn test_apply_bypasses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.wal");

        let mut store = ShardedStore::new(4);
        let wal = Arc::new(WriteAheadLogger::open(&path, SyncPolicy::Always).unwrap());
        store.set_wal(wal.clone());
        store.apply("x".to_string(), "9".to_string());

        assert_eq!(wal.appended(), 0);
        assert_eq!(store.get("x").as_deref(), Some("9"));
    }

    #[test]
    fn test_writes_on_other_shards_are_not_blocked() {
        let store = Arc::new(ShardedStore::new(8));

        // Find two keys owned by different shards
        let blocked_key = "blocked".to_string();
        let blocked_shard = store.shard_index(&blocked_key);
        let free_key = (0..)
            .map(|i| format!("free_{}", i))
            .find(|k| store.shard_index(k) != blocked_shard)
            .unwrap();

        // Hold the write lock of the first shard for the whole test
        let guard = store.shard(blocked_shard).write();

        let (tx, rx) = mpsc::channel();
        let writer = {
            let store = store.clone();
            let free_key = free_key.clone();
            thread::spawn(move || {
                store.set(free_key, "v").unwrap();
                tx.send(()).unwrap();
            })
        };

        rx.recv_timeout(Duration::from_secs(5))
            .expect("write on an unlocked shard was blocked");
        drop(guard);
        writer.join().unwrap();

        assert_eq!(store.get(&free_key).as_deref(), Some("v"));
    }

    #[test]
    fn test_concurrent_sets() {
        let store = Arc::new(ShardedStore::new(16));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        store.set(format!("t{}_k{}", t, i), i.to_string()).unwrap();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.len(), 2000);
        assert_eq!(store.get("t3_k42").as_deref(), Some("42"));
    }

    #[test]
    fn test_shard_stats() {
        let store = ShardedStore::new(4);
        for i in 0..40 {
            store.set(format!("k{}", i), "v").unwrap();
        }

        let stats = store.shard_stats();
        assert_eq!(stats.len(), 4);
        assert_eq!(stats.iter().map(|s| s.keys).sum::<usize>(), 40);
    }
}
