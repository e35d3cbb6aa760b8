//! Snapshot manager
//!
//! Dumps the store to a snapshot file and rebuilds it at startup from the
//! latest snapshot plus the WAL records written after it.

use super::format::{read_snapshot, write_snapshot, SnapshotRecord};
use crate::error::{Error, Result};
use crate::store::ShardedStore;
use crate::wal::{replay_records, unix_timestamp, ReplayStats, WalReader};
use parking_lot::Mutex;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Summary of a loaded snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedSnapshot {
    pub timestamp: u64,
    pub records: usize,
}

/// Takes and loads snapshots, and tracks the watermark
#[derive(Debug, Default)]
pub struct SnapshotManager {
    /// Unix seconds of the last snapshot taken or loaded (0 = none)
    last_snapshot: AtomicU64,
    /// Serializes writers sharing the temporary file
    write_lock: Mutex<()>,
}

impl SnapshotManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The watermark: timestamp of the most recent snapshot
    pub fn last_snapshot(&self) -> u64 {
        self.last_snapshot.load(Ordering::SeqCst)
    }

    /// Write the whole store to `path`.
    ///
    /// The timestamp is taken before the dump starts, so writes racing with
    /// the dump are either in the file or in the WAL after the watermark.
    /// The file is written next to `path` and renamed over it; the live
    /// snapshot is never truncated in place.
    pub fn snapshot<P: AsRef<Path>>(&self, store: &ShardedStore, path: P) -> Result<u64> {
        let path = path.as_ref();
        let _guard = self.write_lock.lock();

        let timestamp = unix_timestamp().max(self.last_snapshot());
        let records: Vec<SnapshotRecord> = store
            .entries()
            .into_iter()
            .map(|(key, value)| SnapshotRecord { key, value })
            .collect();

        let tmp_path = temp_path(path);
        let written = write_file(&tmp_path, timestamp, &records)
            .map_err(|e| Error::io(&tmp_path, e))
            .and_then(|()| fs::rename(&tmp_path, path).map_err(|e| Error::io(path, e)));
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp_path) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove {:?}: {}", tmp_path, cleanup);
                }
            }
            return Err(e);
        }
        sync_parent_dir(path).map_err(|e| Error::io(path, e))?;

        self.last_snapshot.fetch_max(timestamp, Ordering::SeqCst);
        info!("Snapshot written to {:?}: {} records at {}", path, records.len(), timestamp);
        Ok(timestamp)
    }

    /// Load a snapshot into `store`, bypassing the WAL.
    ///
    /// Returns `None` when the file does not exist, meaning the store starts
    /// empty.
    pub fn load_from_snapshot<P: AsRef<Path>>(
        &self,
        store: &ShardedStore,
        path: P,
    ) -> Result<Option<LoadedSnapshot>> {
        let path = path.as_ref();
        info!("Initializing store from snapshot: {:?}", path);

        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No snapshot at {:?}, starting from an empty store", path);
                return Ok(None);
            }
            Err(e) => return Err(Error::io(path, e)),
        };

        let (timestamp, records) = read_snapshot(BufReader::new(file), path)?;
        let count = records.len();
        for record in records {
            store.apply(record.key, record.value);
        }

        self.last_snapshot.fetch_max(timestamp, Ordering::SeqCst);
        info!("Loaded {} records from snapshot {:?} (timestamp {})", count, path, timestamp);

        Ok(Some(LoadedSnapshot {
            timestamp,
            records: count,
        }))
    }

    /// Replay the WAL at `path` into `store`, starting at the watermark.
    ///
    /// A missing log replays nothing.
    pub fn load_from_history_log<P: AsRef<Path>>(
        &self,
        store: &ShardedStore,
        path: P,
    ) -> Result<ReplayStats> {
        let path = path.as_ref();
        let reader = match WalReader::load(path)? {
            Some(reader) => reader,
            None => {
                info!("No WAL at {:?}, nothing to replay", path);
                return Ok(ReplayStats::default());
            }
        };

        debug!("Replaying WAL {:?} ({} bytes)", path, reader.size());
        let parsed = reader.parse_records()?;
        Ok(replay_records(store, &parsed.records, self.last_snapshot()))
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_file(path: &Path, timestamp: u64, records: &[SnapshotRecord]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_snapshot(&mut writer, timestamp, records)?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}
