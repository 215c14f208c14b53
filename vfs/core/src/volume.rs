//! Volumes: the root of a backend's directory tree.

use crate::dir::VfsDir;
use crate::info::VfsObjType;
use crate::lock::LockPolicy;
use crate::obj::{ObjCore, VfsObjOps, impl_handle};
use crate::VfsResult;
use std::sync::Arc;

pub trait VfsVolumeOps: VfsObjOps {
    /// Open the root directory. `volume` is the handle the call came
    /// through; new objects should name it as their owner.
    fn open_root(&self, volume: &VfsVolume) -> VfsResult<VfsDir>;
}

#[derive(Clone)]
pub struct VfsVolume {
    core: Arc<ObjCore<dyn VfsVolumeOps>>,
}

impl_handle!(VfsVolume, VfsVolumeOps, Volume);

impl VfsVolume {
    /// Wrap a backend volume. Volumes have no owner, so
    /// [`LockPolicy::Inherit`] means "no lock" here; backends usually pick
    /// [`LockPolicy::NewReadWrite`] so their objects can share it.
    pub fn new<T: VfsVolumeOps>(ops: T, lock: LockPolicy) -> VfsResult<Self> {
        let core: Arc<ObjCore<dyn VfsVolumeOps>> =
            ObjCore::create(ops, VfsObjType::Volume, None, lock)?;
        Ok(Self { core })
    }

    pub fn open_root(&self) -> VfsResult<VfsDir> {
        self.core.with_read("volume.open_root", |ops| ops.open_root(self))
    }
}
