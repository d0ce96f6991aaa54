//! Minimal NumPy `.npy` (format 1.0) codec for row-major int8 matrices.
//!
//! Only `|i1` C-order arrays are produced; reading also accepts format 2.0 headers.

use std::path::Path;

use super::atomic::atomic_write;
use super::error::{StorageError, StorageResult};
use super::mmap::MmapFileHandle;

const MAGIC: &[u8] = b"\x93NUMPY";
const HEADER_ALIGN: usize = 16;

/// Row-major int8 matrix.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Int8Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<i8>,
}

impl Int8Matrix {
    /// Builds a matrix; `data.len()` must equal `rows * cols`.
    pub fn new(rows: usize, cols: usize, data: Vec<i8>) -> Option<Self> {
        (rows.checked_mul(cols) == Some(data.len())).then_some(Self { rows, cols, data })
    }

    pub fn row(&self, i: usize) -> Option<&[i8]> {
        if i >= self.rows {
            return None;
        }
        Some(&self.data[i * self.cols..(i + 1) * self.cols])
    }

    /// Raw bytes of the payload (no header).
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn nbytes(&self) -> usize {
        self.data.len()
    }
}

/// Serializes `matrix` to `.npy` bytes.
pub fn encode_npy_i8(matrix: &Int8Matrix) -> Vec<u8> {
    let mut header = format!(
        "{{'descr': '|i1', 'fortran_order': False, 'shape': ({}, {}), }}",
        matrix.rows, matrix.cols
    );
    let preamble = MAGIC.len() + 2 + 2;
    let unpadded = preamble + header.len() + 1;
    let pad = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    header.push_str(&" ".repeat(pad));
    header.push('\n');

    let mut out = Vec::with_capacity(preamble + header.len() + matrix.nbytes());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(matrix.as_bytes());
    out
}

/// Atomically writes `matrix` as `.npy`.
pub fn write_npy_i8(path: &Path, matrix: &Int8Matrix) -> StorageResult<()> {
    atomic_write(path, &encode_npy_i8(matrix))
}

/// Reads an int8 `.npy` file through a read-only mapping.
pub fn read_npy_i8(path: &Path) -> StorageResult<Int8Matrix> {
    if !path.exists() {
        return Err(StorageError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let handle = MmapFileHandle::open(path)?;
    decode_npy_i8(handle.as_slice()).map_err(|reason| StorageError::InvalidNpy {
        path: path.to_path_buf(),
        reason,
    })
}

/// Parses `.npy` bytes into an int8 matrix.
pub fn decode_npy_i8(bytes: &[u8]) -> Result<Int8Matrix, String> {
    if bytes.len() < MAGIC.len() + 4 || &bytes[..MAGIC.len()] != MAGIC {
        return Err("missing NUMPY magic".to_string());
    }
    let major = bytes[MAGIC.len()];
    let (header_len, header_start) = match major {
        1 => {
            let raw = [bytes[8], bytes[9]];
            (u16::from_le_bytes(raw) as usize, 10)
        }
        2 | 3 => {
            if bytes.len() < 12 {
                return Err("truncated header length".to_string());
            }
            let raw = [bytes[8], bytes[9], bytes[10], bytes[11]];
            (u32::from_le_bytes(raw) as usize, 12)
        }
        v => return Err(format!("unsupported npy version {v}")),
    };
    let data_start = header_start + header_len;
    if bytes.len() < data_start {
        return Err("truncated header".to_string());
    }
    let header = std::str::from_utf8(&bytes[header_start..data_start])
        .map_err(|e| format!("header is not utf-8: {e}"))?;

    if !(header.contains("'|i1'") || header.contains("'<i1'") || header.contains("'i1'")) {
        return Err(format!("unsupported dtype in header: {}", header.trim()));
    }
    if header.contains("'fortran_order': True") {
        return Err("fortran-ordered arrays are not supported".to_string());
    }

    let dims = parse_shape(header)?;
    let (rows, cols) = match dims.as_slice() {
        [] => (1, 1),
        [n] => (1, *n),
        [r, c] => (*r, *c),
        other => return Err(format!("expected 2-D array, got shape {other:?}")),
    };

    let payload = &bytes[data_start..];
    let expected = rows
        .checked_mul(cols)
        .ok_or_else(|| format!("shape ({rows}, {cols}) overflows usize"))?;
    if payload.len() < expected {
        return Err(format!(
            "payload has {} bytes, shape needs {}",
            payload.len(),
            expected
        ));
    }
    let data: &[i8] = bytemuck::cast_slice(&payload[..expected]);
    Ok(Int8Matrix {
        rows,
        cols,
        data: data.to_vec(),
    })
}

fn parse_shape(header: &str) -> Result<Vec<usize>, String> {
    let start = header
        .find("'shape':")
        .ok_or_else(|| "header has no shape".to_string())?;
    let rest = &header[start + "'shape':".len()..];
    let open = rest.find('(').ok_or_else(|| "malformed shape".to_string())?;
    let close = rest.find(')').ok_or_else(|| "malformed shape".to_string())?;
    if close < open {
        return Err("malformed shape".to_string());
    }
    rest[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_dim)
        .collect()
}

fn parse_dim(s: &str) -> Result<usize, String> {
    s.parse().map_err(|e| format!("bad dim '{s}': {e}"))
}
