//! Snapshot file format
//!
//! `[timestamp: 10 ASCII digits][JSON array of {"Key": .., "Value": ..}]`
//!
//! The timestamp is the Unix time in seconds, zero-padded to 10 digits.
//! Whitespace between the header and the array is accepted on read.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Read, Write};
use std::path::Path;

/// Length of the timestamp header
pub const HEADER_LEN: usize = 10;

/// One key/value pair as stored in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

/// Write a snapshot body to `writer`
pub fn write_snapshot<W: Write>(
    mut writer: W,
    timestamp: u64,
    records: &[SnapshotRecord],
) -> io::Result<()> {
    let header = format!("{:010}", timestamp);
    if header.len() != HEADER_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("timestamp {} does not fit the snapshot header", timestamp),
        ));
    }

    writer.write_all(header.as_bytes())?;
    serde_json::to_writer(&mut writer, records)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// Read a snapshot from `reader`. `path` is only used for error messages.
pub fn read_snapshot<R: BufRead>(mut reader: R, path: &Path) -> Result<(u64, Vec<SnapshotRecord>)> {
    let malformed = |reason: String| Error::MalformedSnapshot {
        path: path.to_path_buf(),
        reason,
    };

    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            malformed("file shorter than the timestamp header".to_string())
        } else {
            Error::io(path, e)
        }
    })?;

    if !header.iter().all(u8::is_ascii_digit) {
        return Err(malformed(format!(
            "invalid timestamp header '{}'",
            String::from_utf8_lossy(&header)
        )));
    }
    let timestamp = std::str::from_utf8(&header)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| malformed("invalid timestamp header".to_string()))?;

    let records: Vec<SnapshotRecord> = serde_json::from_reader(reader).map_err(|e| {
        if e.is_io() {
            Error::io(path, e.into())
        } else {
            malformed(e.to_string())
        }
    })?;

    Ok((timestamp, records))
}
