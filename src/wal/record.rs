//! WAL record format
//!
//! Text format, one record per line: `timestamp,key,value,phase\n`
//!
//! `timestamp` is in Unix seconds. Inside `key` and `value` the characters
//! `\`, `,`, newline and carriage return are escaped as `\\`, `\,`, `\n`
//! and `\r`; everything else is written verbatim.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Which side of a mutation a record marks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Written before the in-memory apply
    Start,
    /// Written after the in-memory apply succeeded
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Phase::Start),
            "done" => Some(Phase::Done),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single WAL record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Unix seconds at append time
    pub timestamp: u64,
    pub key: String,
    pub value: String,
    pub phase: Phase,
}

impl LogRecord {
    /// Serialize to a newline-terminated line
    pub fn to_line(&self) -> String {
        format_line(self.timestamp, &self.key, &self.value, self.phase)
    }

    /// Parse one line (without its trailing newline)
    pub fn parse_line(line: &str) -> Result<Self, String> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let fields = split_fields(line)?;

        let [timestamp, key, value, phase]: [String; 4] = fields
            .try_into()
            .map_err(|f: Vec<String>| format!("expected 4 fields, found {}", f.len()))?;

        let timestamp = timestamp
            .parse::<u64>()
            .map_err(|_| format!("invalid timestamp '{}'", timestamp))?;
        let phase = Phase::parse(&phase).ok_or_else(|| format!("invalid phase '{}'", phase))?;

        Ok(LogRecord {
            timestamp,
            key,
            value,
            phase,
        })
    }
}

/// Current Unix time in seconds
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Build a newline-terminated line without allocating a `LogRecord`
pub(crate) fn format_line(timestamp: u64, key: &str, value: &str, phase: Phase) -> String {
    let mut line = String::with_capacity(key.len() + value.len() + 24);
    line.push_str(&timestamp.to_string());
    line.push(',');
    escape_into(key, &mut line);
    line.push(',');
    escape_into(value, &mut line);
    line.push(',');
    line.push_str(phase.as_str());
    line.push('\n');
    line
}

fn escape_into(field: &str, out: &mut String) {
    for c in field.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
}

/// Split on unescaped commas, undoing the escapes
fn split_fields(line: &str) -> Result<Vec<String>, String> {
    let mut fields = Vec::with_capacity(4);
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\\') => current.push('\\'),
                Some(',') => current.push(','),
                Some('n') => current.push('\n'),
                Some('r') => current.push('\r'),
                Some(other) => return Err(format!("invalid escape '\\{}'", other)),
                None => return Err("dangling escape at end of line".to_string()),
            },
            ',' => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);

    Ok(fields)
}
