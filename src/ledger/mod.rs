//! Append-only JSONL evidence ledger.
//!
//! Every verify decision and every effective KB promotion is recorded as one compact JSON
//! object per line. Writers append whole lines; readers tolerate a single truncated line at
//! the very end of the file (an interrupted append) and nothing else.

pub mod error;

#[cfg(test)]
mod tests;

pub use error::{LedgerError, LedgerResult};

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::storage::append_line;

/// Sink for decision records.
pub trait EvidenceLedger: Send + Sync {
    /// Appends one record.
    fn append(&self, entry: &Value) -> LedgerResult<()>;

    /// Location of the ledger, when it is file-backed.
    fn location(&self) -> Option<&Path> {
        None
    }
}

/// File-backed JSONL ledger.
#[derive(Debug, Clone)]
pub struct JsonLedger {
    path: PathBuf,
}

impl JsonLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes `entry` and appends it.
    pub fn append_record<T: Serialize>(&self, entry: &T) -> LedgerResult<()> {
        let value = serde_json::to_value(entry)?;
        self.append(&value)
    }

    /// Reads every complete entry. A missing file reads as empty.
    pub fn read_entries(&self) -> LedgerResult<Vec<Value>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.path)?;
        parse_entries(&text)
    }

    /// Number of complete entries.
    pub fn len(&self) -> LedgerResult<usize> {
        Ok(self.read_entries()?.len())
    }

    pub fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl EvidenceLedger for JsonLedger {
    fn append(&self, entry: &Value) -> LedgerResult<()> {
        let line = serde_json::to_string(entry)?;
        append_line(&self.path, &line)?;
        Ok(())
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

fn parse_entries(text: &str) -> LedgerResult<Vec<Value>> {
    let complete = text.ends_with('\n');
    let lines: Vec<&str> = text.lines().collect();
    let last = lines.len().saturating_sub(1);

    let mut entries = Vec::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => entries.push(value),
            Err(e) if idx == last && !complete => {
                warn!(line = idx + 1, error = %e, "ignoring truncated trailing ledger line");
            }
            Err(e) => {
                return Err(LedgerError::Corrupt {
                    line: idx + 1,
                    source: e,
                });
            }
        }
    }
    Ok(entries)
}
