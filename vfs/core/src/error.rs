//! Error types shared by every handle operation.

use std::fmt;
use std::io;
use thiserror::Error;

pub type VfsResult<T> = Result<T, VfsError>;

/// Classification of a failed VFS operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum VfsErrorKind {
    /// The handle is dead, poisoned or of the wrong kind for the call.
    InvalidHandle,
    /// An operations table declared a version or end marker this layer does not speak.
    VersionMismatch,
    NoMemory,
    NameTooLong,
    TooManySymlinks,
    PathNotFound,
    FileNotFound,
    NotDir,
    IsDir,
    NotSymlink,
    AlreadyExists,
    DirNotEmpty,
    PermissionDenied,
    /// The backend does not provide the requested callback.
    NotSupported,
    InvalidInput,
    TimedOut,
    Interrupted,
    WouldBlock,
    UnexpectedEof,
    Io,
    Internal,
}

impl VfsErrorKind {
    /// Stable snake_case name, for logging.
    pub fn as_str(self) -> &'static str {
        match self {
            VfsErrorKind::InvalidHandle => "invalid_handle",
            VfsErrorKind::VersionMismatch => "version_mismatch",
            VfsErrorKind::NoMemory => "no_memory",
            VfsErrorKind::NameTooLong => "name_too_long",
            VfsErrorKind::TooManySymlinks => "too_many_symlinks",
            VfsErrorKind::PathNotFound => "path_not_found",
            VfsErrorKind::FileNotFound => "file_not_found",
            VfsErrorKind::NotDir => "not_dir",
            VfsErrorKind::IsDir => "is_dir",
            VfsErrorKind::NotSymlink => "not_symlink",
            VfsErrorKind::AlreadyExists => "already_exists",
            VfsErrorKind::DirNotEmpty => "dir_not_empty",
            VfsErrorKind::PermissionDenied => "permission_denied",
            VfsErrorKind::NotSupported => "not_supported",
            VfsErrorKind::InvalidInput => "invalid_input",
            VfsErrorKind::TimedOut => "timed_out",
            VfsErrorKind::Interrupted => "interrupted",
            VfsErrorKind::WouldBlock => "would_block",
            VfsErrorKind::UnexpectedEof => "unexpected_eof",
            VfsErrorKind::Io => "io",
            VfsErrorKind::Internal => "internal",
        }
    }

    /// True for the kinds a directory lookup uses to say "no such entry".
    pub fn is_not_found(self) -> bool {
        matches!(
            self,
            VfsErrorKind::FileNotFound | VfsErrorKind::PathNotFound | VfsErrorKind::NotDir
        )
    }
}

impl fmt::Display for VfsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by every fallible call in this crate.
///
/// `context` names the operation that failed (`"path.traverse.symlink"`,
/// `"io.read"`, ...) and is meant for diagnostics only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("{context}: {kind}")]
pub struct VfsError {
    kind: VfsErrorKind,
    context: &'static str,
}

impl VfsError {
    pub const fn new(kind: VfsErrorKind, context: &'static str) -> Self {
        Self { kind, context }
    }

    pub fn kind(&self) -> VfsErrorKind {
        self.kind
    }

    pub fn context(&self) -> &'static str {
        self.context
    }
}

impl From<io::Error> for VfsError {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => VfsErrorKind::FileNotFound,
            io::ErrorKind::PermissionDenied => VfsErrorKind::PermissionDenied,
            io::ErrorKind::AlreadyExists => VfsErrorKind::AlreadyExists,
            io::ErrorKind::WouldBlock => VfsErrorKind::WouldBlock,
            io::ErrorKind::InvalidInput => VfsErrorKind::InvalidInput,
            io::ErrorKind::TimedOut => VfsErrorKind::TimedOut,
            io::ErrorKind::Interrupted => VfsErrorKind::Interrupted,
            io::ErrorKind::UnexpectedEof => VfsErrorKind::UnexpectedEof,
            io::ErrorKind::OutOfMemory => VfsErrorKind::NoMemory,
            io::ErrorKind::Unsupported => VfsErrorKind::NotSupported,
            _ => VfsErrorKind::Io,
        };
        VfsError::new(kind, "io.host")
    }
}

impl From<VfsError> for io::Error {
    fn from(err: VfsError) -> Self {
        let kind = match err.kind() {
            VfsErrorKind::FileNotFound | VfsErrorKind::PathNotFound => io::ErrorKind::NotFound,
            VfsErrorKind::PermissionDenied => io::ErrorKind::PermissionDenied,
            VfsErrorKind::AlreadyExists => io::ErrorKind::AlreadyExists,
            VfsErrorKind::WouldBlock => io::ErrorKind::WouldBlock,
            VfsErrorKind::InvalidInput | VfsErrorKind::NameTooLong => io::ErrorKind::InvalidInput,
            VfsErrorKind::TimedOut => io::ErrorKind::TimedOut,
            VfsErrorKind::Interrupted => io::ErrorKind::Interrupted,
            VfsErrorKind::UnexpectedEof => io::ErrorKind::UnexpectedEof,
            VfsErrorKind::NoMemory => io::ErrorKind::OutOfMemory,
            VfsErrorKind::NotSupported => io::ErrorKind::Unsupported,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
