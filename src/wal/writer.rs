//! WAL writer
//!
//! Appends records to the log file through a single mutex, so the file order
//! is the global order of mutation attempts.

use super::record::{format_line, unix_timestamp};
use super::{Phase, SyncPolicy};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

struct LogFile {
    file: File,
    /// Length of the file up to the last complete record
    len: u64,
    last_sync: Instant,
    appended: u64,
    last_timestamp: u64,
}

impl LogFile {
    /// Write one line and sync it per `policy`
    fn write_line(&mut self, line: &[u8], policy: SyncPolicy) -> io::Result<()> {
        self.file.write_all(line)?;

        match policy {
            SyncPolicy::Always => self.file.sync_data()?,
            SyncPolicy::EverySecond => {
                if self.last_sync.elapsed() >= Duration::from_secs(1) {
                    self.file.sync_data()?;
                    self.last_sync = Instant::now();
                }
            }
            SyncPolicy::No => {}
        }
        Ok(())
    }

    /// Cut off whatever a failed append left after the last complete record
    fn rollback(&mut self) -> io::Result<()> {
        self.file.set_len(self.len)
    }
}

/// Write-ahead logger
pub struct WriteAheadLogger {
    path: PathBuf,
    inner: Mutex<LogFile>,
    sync_policy: SyncPolicy,
}

impl WriteAheadLogger {
    /// Open or create the log at `path`.
    ///
    /// A partial last line left by a crash is cut off first, so new records
    /// always start on a fresh line.
    pub fn open<P: AsRef<Path>>(path: P, sync_policy: SyncPolicy) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;

        if let Some(dropped) = truncate_partial_tail(&mut file).map_err(|e| Error::io(&path, e))? {
            warn!("WAL {:?}: dropped {} bytes of partial record at tail", path, dropped);
        }
        let len = file.metadata().map_err(|e| Error::io(&path, e))?.len();

        info!("WAL opened at {:?} (sync policy: {:?})", path, sync_policy);

        Ok(WriteAheadLogger {
            path,
            inner: Mutex::new(LogFile {
                file,
                len,
                last_sync: Instant::now(),
                appended: 0,
                last_timestamp: 0,
            }),
            sync_policy,
        })
    }

    /// Append a record for `key`/`value` in the given phase.
    ///
    /// On failure the file is cut back to its length before the call, so a
    /// short write never leaves a fragment for the next record to fuse with.
    pub fn append(&self, phase: Phase, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        // Stamped under the lock and never decreasing, so timestamps follow file order
        let timestamp = unix_timestamp().max(inner.last_timestamp);
        let line = format_line(timestamp, key, value, phase);

        if let Err(e) = inner.write_line(line.as_bytes(), self.sync_policy) {
            if let Err(rollback) = inner.rollback() {
                error!("WAL {:?}: failed to roll back partial append: {}", self.path, rollback);
            }
            return Err(Error::io(&self.path, e));
        }

        inner.len += line.len() as u64;
        inner.last_timestamp = timestamp;
        inner.appended += 1;
        debug!("WAL append: {} {}", phase, key);
        Ok(())
    }

    /// Never stamp records below `timestamp` from now on.
    ///
    /// Replay skips records older than the snapshot watermark, so the
    /// watermark must be a floor for every record written after it, even
    /// when the wall clock is behind it.
    pub fn raise_floor(&self, timestamp: u64) {
        let mut inner = self.inner.lock();
        inner.last_timestamp = inner.last_timestamp.max(timestamp);
    }

    /// Force sync to disk
    pub fn sync(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.file.sync_all().map_err(|e| Error::io(&self.path, e))?;
        inner.last_sync = Instant::now();
        Ok(())
    }

    /// Number of records appended through this logger
    pub fn appended(&self) -> u64 {
        self.inner.lock().appended
    }
}

/// Cut the file back to its last newline. Returns the number of bytes dropped.
fn truncate_partial_tail(file: &mut File) -> io::Result<Option<u64>> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(None);
    }

    let mut buf = [0u8; 4096];
    let mut end = len;
    let keep = loop {
        let start = end.saturating_sub(buf.len() as u64);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;

        if let Some(pos) = chunk.iter().rposition(|b| *b == b'\n') {
            break start + pos as u64 + 1;
        }
        if start == 0 {
            break 0;
        }
        end = start;
    };

    if keep == len {
        return Ok(None);
    }

    file.set_len(keep)?;
    file.sync_all()?;
    Ok(Some(len - keep))
}
