//! Backend-agnostic virtual filesystem object layer.
//!
//! Backends implement the per-kind operations traits ([`VfsVolumeOps`],
//! [`VfsDirOps`], [`VfsFileOps`], ...) and wrap instances in typed handles.
//! Consumers only see the handles, [`ParsedPath`] and the traversal engine
//! in [`PathWalker`].

mod config;
mod dir;
mod error;
mod file;
mod flags;
mod fs_stream;
mod info;
mod io;
mod lock;
mod obj;
mod path;
mod path_walker;
mod symlink;
pub mod util;
mod volume;

pub use config::{DEFAULT_IO_CHUNK_SIZE, VfsConfig};
pub use dir::{TraversalEntry, VfsDir, VfsDirEntry, VfsDirOps};
pub use error::{VfsError, VfsErrorKind, VfsResult};
pub use file::{VfsFile, VfsFileOps};
pub use flags::{OpenFlags, PollEvents, VfsOpsFeatures};
pub use fs_stream::{FsStreamEntry, VfsFsStream, VfsFsStreamOps};
pub use info::{VfsFileMode, VfsFileType, VfsObjInfo, VfsObjType, VfsSetTimes, VfsTimespec};
pub use io::{Transfer, VfsIoStream, VfsIoStreamOps};
pub use lock::{LockPolicy, VfsLock, VfsLockGuard, VfsLockKind};
pub use obj::{
    AsAny, VFS_OPS_VERSION, VfsObj, VfsObjOps, VfsObjSetOps, VfsOpsDescriptor, WeakVfsObj,
};
pub use path::ParsedPath;
pub use path_walker::{PathWalker, ResolvedParent, TraversalInfo, traverse_to_parent};
pub use symlink::{VfsSymlink, VfsSymlinkOps};
pub use volume::{VfsVolume, VfsVolumeOps};
