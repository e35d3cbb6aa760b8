//! WAL reader
//!
//! Loads the log file and parses it into records. A final line without its
//! terminating newline is the trace of a write cut short by a crash; it is
//! skipped. Any other unparsable line is an error.

use super::LogRecord;
use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Result of parsing a whole log
#[derive(Debug, Default)]
pub struct ParsedLog {
    pub records: Vec<LogRecord>,
    /// Whether a partial last line was skipped
    pub partial_tail: bool,
}

/// WAL reader
pub struct WalReader {
    path: PathBuf,
    data: String,
}

impl WalReader {
    /// Load the log file. A missing file yields `None`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(&path, e)),
        };

        // A crash can cut a multi-byte character in half; only the tail may be lossy
        let data = match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => {
                let valid = e.utf8_error().valid_up_to();
                let bytes = e.into_bytes();
                if bytes[valid..].contains(&b'\n') {
                    let line = bytes[..valid].iter().filter(|b| **b == b'\n').count() + 1;
                    return Err(Error::MalformedLog {
                        path,
                        line,
                        reason: "invalid UTF-8".to_string(),
                    });
                }
                String::from_utf8_lossy(&bytes).into_owned()
            }
        };

        Ok(Some(WalReader { path, data }))
    }

    /// Parse all records, in file order
    pub fn parse_records(&self) -> Result<ParsedLog> {
        let mut parsed = ParsedLog::default();
        let mut rest = self.data.as_str();
        let mut line_no = 0;

        while !rest.is_empty() {
            line_no += 1;
            let line = match rest.find('\n') {
                Some(pos) => {
                    let line = &rest[..pos];
                    rest = &rest[pos + 1..];
                    line
                }
                None => {
                    warn!(
                        "WAL {:?}: skipping partial record at line {} ({} bytes)",
                        self.path,
                        line_no,
                        rest.len()
                    );
                    parsed.partial_tail = true;
                    break;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            let record = LogRecord::parse_line(line).map_err(|reason| Error::MalformedLog {
                path: self.path.clone(),
                line: line_no,
                reason,
            })?;
            parsed.records.push(record);
        }

        info!("WAL {:?} loaded: {} records", self.path, parsed.records.len());
        Ok(parsed)
    }

    /// Get the total size of the log data
    pub fn size(&self) -> usize {
        self.data.len()
    }
}
