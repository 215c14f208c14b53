use crate::fs::{MemFsInner, NodeHandle, NodeKind, NodeRef};
use std::sync::Arc;
use vfsobj_core::{
    LockPolicy, VfsError, VfsErrorKind, VfsObjInfo, VfsObjOps, VfsObjSetOps, VfsObjType,
    VfsOpsDescriptor, VfsOpsFeatures, VfsResult, VfsSetTimes, VfsSymlink, VfsSymlinkOps,
    VfsVolume,
};

static MEM_SYMLINK_OPS: VfsOpsDescriptor =
    VfsOpsDescriptor::new("memfs-symlink", VfsObjType::Symlink, VfsOpsFeatures::empty());

pub(crate) struct MemSymlink {
    handle: NodeHandle,
}

impl MemSymlink {
    pub(crate) fn open(
        fs: &Arc<MemFsInner>,
        node: NodeRef,
        volume: Option<&VfsVolume>,
    ) -> VfsResult<VfsSymlink> {
        let link = MemSymlink {
            handle: NodeHandle::new(fs, node),
        };
        let link = VfsSymlink::new(link, volume, LockPolicy::Inherit)?;
        fs.opened();
        Ok(link)
    }
}

impl VfsObjOps for MemSymlink {
    fn descriptor(&self) -> &'static VfsOpsDescriptor {
        &MEM_SYMLINK_OPS
    }

    fn close(&self) -> VfsResult<()> {
        self.handle.fs.closed();
        Ok(())
    }

    fn query_info(&self) -> VfsResult<VfsObjInfo> {
        self.handle.info()
    }
}

impl VfsObjSetOps for MemSymlink {
    fn set_mode(&self, mode: u32, mask: u32) -> VfsResult<()> {
        self.handle.set_mode(mode, mask)
    }

    fn set_times(&self, times: VfsSetTimes) -> VfsResult<()> {
        self.handle.set_times(times)
    }

    fn set_owner(&self, uid: Option<u32>, gid: Option<u32>) -> VfsResult<()> {
        self.handle.set_owner(uid, gid)
    }
}

impl VfsSymlinkOps for MemSymlink {
    fn read(&self) -> VfsResult<String> {
        let state = self.handle.fs.state.read();
        match &state.get(self.handle.node, "mem.symlink.stale")?.kind {
            NodeKind::Symlink { target } => Ok(target.clone()),
            _ => Err(VfsError::new(VfsErrorKind::Internal, "mem.symlink.kind")),
        }
    }
}
