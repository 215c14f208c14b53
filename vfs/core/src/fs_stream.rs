//! Filesystem streams: ordered sequences of named objects (archive-like).

use crate::info::VfsObjType;
use crate::lock::LockPolicy;
use crate::obj::{ObjCore, VfsObj, VfsObjOps, impl_handle};
use crate::volume::VfsVolume;
use crate::{VfsError, VfsErrorKind, VfsResult};
use std::sync::Arc;

/// One member of a filesystem stream.
#[derive(Debug)]
pub struct FsStreamEntry {
    /// Path of the member relative to the stream root, `/`-separated.
    pub name: String,
    pub obj: VfsObj,
}

pub trait VfsFsStreamOps: VfsObjOps {
    /// The next member, `None` at the end of the stream.
    fn next(&self, volume: Option<&VfsVolume>) -> VfsResult<Option<FsStreamEntry>>;

    fn add(&self, _name: &str, _obj: &VfsObj) -> VfsResult<()> {
        Err(VfsError::new(VfsErrorKind::NotSupported, "fs_stream.add"))
    }

    /// Finish a stream being written.
    fn end(&self) -> VfsResult<()> {
        Err(VfsError::new(VfsErrorKind::NotSupported, "fs_stream.end"))
    }
}

#[derive(Clone)]
pub struct VfsFsStream {
    core: Arc<ObjCore<dyn VfsFsStreamOps>>,
}

impl_handle!(VfsFsStream, VfsFsStreamOps, FsStream);

impl VfsFsStream {
    pub fn new<T: VfsFsStreamOps>(
        ops: T,
        volume: Option<&VfsVolume>,
        lock: LockPolicy,
    ) -> VfsResult<Self> {
        let core: Arc<ObjCore<dyn VfsFsStreamOps>> =
            ObjCore::create(ops, VfsObjType::FsStream, volume, lock)?;
        Ok(Self { core })
    }

    pub fn next(&self) -> VfsResult<Option<FsStreamEntry>> {
        self.core.with_write("fs_stream.next", |ops| ops.next(self.core.volume()))
    }

    pub fn add(&self, name: &str, obj: &VfsObj) -> VfsResult<()> {
        self.core.with_write("fs_stream.add", |ops| ops.add(name, obj))
    }

    pub fn end(&self) -> VfsResult<()> {
        self.core.with_write("fs_stream.end", |ops| ops.end())
    }
}
