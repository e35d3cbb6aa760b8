//! Error types for the storage core
//!
//! Every failure the core surfaces is either a normal "not found" outcome,
//! an I/O failure on a persisted file, or a parse failure on persisted data.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the store, the WAL and the snapshot manager
#[derive(Error, Debug)]
pub enum Error {
    /// A prefix scan matched no key
    #[error("no key with prefix '{0}' found")]
    NotFound(String),

    /// Unable to open, read, write or rename a persisted file
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The snapshot file does not follow the expected layout
    #[error("malformed snapshot {path:?}: {reason}")]
    MalformedSnapshot { path: PathBuf, reason: String },

    /// A complete WAL line could not be parsed
    #[error("malformed WAL record in {path:?} at line {line}: {reason}")]
    MalformedLog {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether this error is the benign "nothing matched" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
