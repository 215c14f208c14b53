//! Symbolic link handles.

use crate::info::VfsObjType;
use crate::lock::LockPolicy;
use crate::obj::{ObjCore, VfsObjOps, VfsObjSetOps, impl_handle};
use crate::volume::VfsVolume;
use crate::VfsResult;
use std::sync::Arc;

pub trait VfsSymlinkOps: VfsObjOps + VfsObjSetOps {
    /// The link target as stored; may be relative or absolute.
    fn read(&self) -> VfsResult<String>;
}

#[derive(Clone)]
pub struct VfsSymlink {
    pub(crate) core: Arc<ObjCore<dyn VfsSymlinkOps>>,
}

impl_handle!(VfsSymlink, VfsSymlinkOps, Symlink);

impl VfsSymlink {
    pub fn new<T: VfsSymlinkOps>(
        ops: T,
        volume: Option<&VfsVolume>,
        lock: LockPolicy,
    ) -> VfsResult<Self> {
        let core: Arc<ObjCore<dyn VfsSymlinkOps>> =
            ObjCore::create(ops, VfsObjType::Symlink, volume, lock)?;
        Ok(Self { core })
    }

    pub fn read(&self) -> VfsResult<String> {
        self.core.with_read("symlink.read", |ops| ops.read())
    }
}
