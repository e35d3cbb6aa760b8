//! Configuration
//!
//! All fields have defaults, so an empty JSON object (or no file at all) is a
//! valid configuration.

use crate::error::{Error, Result};
use crate::store::DEFAULT_SHARDS;
use crate::wal::SyncPolicy;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the WAL and the snapshot
    pub data_dir: PathBuf,

    /// Number of shards. Changing it between runs is safe: recovery
    /// re-routes every key.
    pub shard_count: usize,

    /// WAL file name, relative to `data_dir`
    pub wal_file: String,

    /// Snapshot file name, relative to `data_dir`
    pub snapshot_file: String,

    /// Seconds between periodic snapshots (0 disables them)
    pub snapshot_interval_secs: u64,

    pub sync_policy: SyncPolicy,

    /// Listen address of the HTTP front end
    pub http_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("data"),
            shard_count: DEFAULT_SHARDS,
            wal_file: "history.log".to_string(),
            snapshot_file: "snapshot.json".to_string(),
            snapshot_interval_secs: 60,
            sync_policy: SyncPolicy::Always,
            http_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Config {
    /// Load from a JSON file, or use the defaults when `path` is `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
                serde_json::from_str(&text)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?
            }
            None => Config::default(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 {
            return Err(Error::Config("shard_count must be > 0".to_string()));
        }
        if self.wal_file.is_empty() || self.snapshot_file.is_empty() {
            return Err(Error::Config("wal_file and snapshot_file must be set".to_string()));
        }
        if self.wal_file == self.snapshot_file {
            return Err(Error::Config("wal_file and snapshot_file must differ".to_string()));
        }
        Ok(())
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(&self.wal_file)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(&self.snapshot_file)
    }

    /// Interval of the periodic snapshot task, if enabled
    pub fn snapshot_interval(&self) -> Option<Duration> {
        match self.snapshot_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
