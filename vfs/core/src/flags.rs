//! Flag sets passed across the backend boundary.

use bitflags::bitflags;

bitflags! {
    /// How a file is opened through a directory.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const APPEND = 1 << 2;
        /// Create the file if it does not exist.
        const CREATE = 1 << 3;
        /// With `CREATE`: fail with `AlreadyExists` if the file exists.
        const EXCLUSIVE = 1 << 4;
        const TRUNCATE = 1 << 5;
    }
}

impl OpenFlags {
    pub fn wants_write(self) -> bool {
        self.intersects(OpenFlags::WRITE | OpenFlags::APPEND | OpenFlags::TRUNCATE)
    }
}

bitflags! {
    /// Readiness events for [`crate::VfsIoStream::poll`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PollEvents: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const ERROR = 1 << 2;
    }
}

bitflags! {
    /// Optional capabilities declared by an operations table.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct VfsOpsFeatures: u32 {
        /// `read_sg` / `write_sg` are implemented natively.
        const SCATTER_GATHER = 1 << 0;
    }
}
