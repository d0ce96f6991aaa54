//! Flat-file storage primitives: atomic writes, line appends, mmap reads and int8 `.npy`.

mod atomic;
pub mod error;
pub mod mmap;
pub mod npy;


pub use atomic::{append_line, atomic_write, atomic_write_json};
pub use error::{StorageError, StorageResult};
pub use mmap::{MmapError, MmapFileHandle};
pub use npy::{Int8Matrix, decode_npy_i8, encode_npy_i8, read_npy_i8, write_npy_i8};
