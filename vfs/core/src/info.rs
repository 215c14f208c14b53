//! Object metadata returned by `query_info`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Kind of object behind a handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VfsObjType {
    Volume,
    Directory,
    Symlink,
    IoStream,
    File,
    FsStream,
}

impl VfsObjType {
    pub fn as_str(self) -> &'static str {
        match self {
            VfsObjType::Volume => "volume",
            VfsObjType::Directory => "directory",
            VfsObjType::Symlink => "symlink",
            VfsObjType::IoStream => "io_stream",
            VfsObjType::File => "file",
            VfsObjType::FsStream => "fs_stream",
        }
    }
}

/// What an entry is on its backing store (independent of how it is opened).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VfsFileType {
    RegularFile,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct VfsFileMode(pub u32);

impl VfsFileMode {
    pub const PERMISSION_MASK: u32 = 0o7777;

    pub fn permissions(self) -> u32 {
        self.0 & Self::PERMISSION_MASK
    }

    /// Replace the bits selected by `mask` with the matching bits of `mode`.
    pub fn apply(self, mode: u32, mask: u32) -> Self {
        Self((self.0 & !mask) | (mode & mask))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct VfsTimespec {
    pub secs: i64,
    pub nanos: u32,
}

impl VfsTimespec {
    pub const EPOCH: VfsTimespec = VfsTimespec { secs: 0, nanos: 0 };

    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }
}

impl From<SystemTime> for VfsTimespec {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(since) => Self {
                secs: since.as_secs() as i64,
                nanos: since.subsec_nanos(),
            },
            Err(err) => {
                let before = err.duration();
                let mut secs = -(before.as_secs() as i64);
                let mut nanos = before.subsec_nanos();
                if nanos > 0 {
                    secs -= 1;
                    nanos = 1_000_000_000 - nanos;
                }
                Self { secs, nanos }
            }
        }
    }
}

impl From<VfsTimespec> for SystemTime {
    fn from(ts: VfsTimespec) -> Self {
        if ts.secs >= 0 {
            UNIX_EPOCH + Duration::new(ts.secs as u64, ts.nanos)
        } else {
            UNIX_EPOCH - Duration::from_secs(ts.secs.unsigned_abs())
                + Duration::from_nanos(ts.nanos as u64)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VfsObjInfo {
    pub file_type: VfsFileType,
    pub mode: VfsFileMode,
    /// Logical size in bytes.
    pub size: u64,
    /// Bytes allocated on the backing store.
    pub allocated: u64,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    /// Backend-defined identity, stable while the object exists.
    pub inode: u64,
    pub atime: VfsTimespec,
    pub mtime: VfsTimespec,
    pub ctime: VfsTimespec,
    pub btime: VfsTimespec,
}

impl VfsObjInfo {
    /// Zeroed metadata of the given type; backends fill in what they track.
    pub fn new(file_type: VfsFileType) -> Self {
        Self {
            file_type,
            mode: VfsFileMode::default(),
            size: 0,
            allocated: 0,
            nlink: 1,
            uid: 0,
            gid: 0,
            inode: 0,
            atime: VfsTimespec::EPOCH,
            mtime: VfsTimespec::EPOCH,
            ctime: VfsTimespec::EPOCH,
            btime: VfsTimespec::EPOCH,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == VfsFileType::Directory
    }
}

/// Timestamps to change in `set_times`; `None` leaves a field untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VfsSetTimes {
    pub atime: Option<VfsTimespec>,
    pub mtime: Option<VfsTimespec>,
    pub ctime: Option<VfsTimespec>,
    pub btime: Option<VfsTimespec>,
}
