//! Tunables for path parsing, traversal and the generic I/O emulation.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Chunk used by the skip/zero-fill emulation and by stream pumping unless
/// a [`VfsConfig`] says otherwise.
pub const DEFAULT_IO_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct VfsConfig {
    /// Symlink hops a single traversal may take before failing with
    /// `TooManySymlinks`.
    pub max_symlinks: u16,
    /// Upper bound on the canonical length of a parsed path, in bytes.
    pub max_path_len: usize,
    /// Upper bound on a single component, in bytes.
    pub max_name_len: usize,
    /// Chunk size for stream pumping and filesystem-stream extraction.
    pub io_chunk_size: usize,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            max_symlinks: 40,
            max_path_len: 4096,
            max_name_len: 255,
            io_chunk_size: DEFAULT_IO_CHUNK_SIZE,
        }
    }
}
