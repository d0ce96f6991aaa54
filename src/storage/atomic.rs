use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use super::error::{StorageError, StorageResult};

/// Writes `bytes` to `path` via a synced temp file in the same directory and a rename.
///
/// Readers observe either the previous contents or the new contents, never a prefix.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StorageError::PersistFailed {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "atomic write");
    Ok(())
}

/// Serializes `value` as JSON and writes it atomically.
pub fn atomic_write_json<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    pretty: bool,
) -> StorageResult<()> {
    let mut bytes = if pretty {
        serde_json::to_vec_pretty(value)?
    } else {
        serde_json::to_vec(value)?
    };
    if pretty {
        bytes.push(b'\n');
    }
    atomic_write(path, &bytes)
}

/// Appends one line to `path` with a single `write_all` on an append-mode handle.
///
/// A trailing `\n` is added when missing. The line is synced before returning.
pub fn append_line(path: &Path, line: &str) -> StorageResult<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir)?;
    }

    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    if !buf.ends_with('\n') {
        buf.push('\n');
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(buf.as_bytes())?;
    file.sync_data()?;
    Ok(())
}
