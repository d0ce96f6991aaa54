//! Read-only mappings of persisted artifacts.

pub mod error;

pub use error::{MmapError, MmapResult};

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

/// Read-only view of one artifact file (`vocab.int8.npy`, medoid sets).
#[derive(Debug)]
pub struct MmapFileHandle {
    map: Mmap,
    path: PathBuf,
}

impl MmapFileHandle {
    pub fn open(path: &Path) -> MmapResult<Self> {
        let map_err = |source| MmapError::Map {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(map_err)?;
        if file.metadata().map_err(map_err)?.len() == 0 {
            return Err(MmapError::EmptyFile {
                path: path.to_path_buf(),
            });
        }

        // SAFETY: artifacts are only ever replaced by rename, never truncated in place, so
        // the mapped inode stays valid for the lifetime of the handle.
        let map = unsafe { Mmap::map(&file) }.map_err(map_err)?;

        Ok(Self {
            map,
            path: path.to_path_buf(),
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.map
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
