//! A single lock-guarded partition of the key space

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use siphasher::sip::SipHasher13;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;

/// Type alias for the shard map with SipHasher
pub(crate) type ShardMap = HashMap<String, String, BuildHasherDefault<SipHasher13>>;

/// One partition of the store, guarded by its own reader/writer lock
#[derive(Debug, Default)]
pub struct Shard {
    map: RwLock<ShardMap>,
}

impl Shard {
    /// Create an empty shard
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of the value stored under `key`
    pub fn get(&self, key: &str) -> Option<String> {
        self.map.read().get(key).cloned()
    }

    /// Insert or overwrite a key
    pub fn insert(&self, key: String, value: String) {
        self.map.write().insert(key, value);
    }

    /// Append the values of all keys starting with `prefix` to `out`
    pub fn collect_prefix(&self, prefix: &str, out: &mut Vec<String>) {
        collect_prefix(&self.map.read(), prefix, out);
    }

    /// Copy every `(key, value)` pair of this shard into `out`
    pub fn collect_entries(&self, out: &mut Vec<(String, String)>) {
        let map = self.map.read();
        out.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Number of keys in this shard
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Check if the shard is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, ShardMap> {
        self.map.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, ShardMap> {
        self.map.write()
    }
}

pub(crate) fn collect_prefix(map: &ShardMap, prefix: &str, out: &mut Vec<String>) {
    out.extend(
        map.iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(_, value)| value.clone()),
    );
}
