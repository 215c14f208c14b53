use crate::file::MemFile;
use crate::fs::{MemFsInner, NodeHandle, NodeKind, NodeRef};
use crate::symlink::MemSymlink;
use parking_lot::Mutex;
use std::sync::Arc;
use vfsobj_core::{
    LockPolicy, OpenFlags, TraversalEntry, VfsDir, VfsDirEntry, VfsDirOps, VfsError,
    VfsErrorKind, VfsFile, VfsObjInfo, VfsObjOps, VfsObjSetOps, VfsObjType, VfsOpsDescriptor,
    VfsOpsFeatures, VfsResult, VfsSymlink, VfsVolume,
};

static MEM_DIR_OPS: VfsOpsDescriptor =
    VfsOpsDescriptor::new("memfs-dir", VfsObjType::Directory, VfsOpsFeatures::empty());

pub(crate) struct MemDir {
    handle: NodeHandle,
    cursor: Mutex<usize>,
}

impl MemDir {
    pub(crate) fn open(
        fs: &Arc<MemFsInner>,
        node: NodeRef,
        volume: Option<&VfsVolume>,
    ) -> VfsResult<VfsDir> {
        let dir = MemDir {
            handle: NodeHandle::new(fs, node),
            cursor: Mutex::new(0),
        };
        let dir = VfsDir::new(dir, volume, LockPolicy::Inherit)?;
        fs.opened();
        Ok(dir)
    }

    fn fs(&self) -> &Arc<MemFsInner> {
        &self.handle.fs
    }

    fn node(&self) -> NodeRef {
        self.handle.node
    }
}

impl VfsObjOps for MemDir {
    fn descriptor(&self) -> &'static VfsOpsDescriptor {
        &MEM_DIR_OPS
    }

    fn close(&self) -> VfsResult<()> {
        self.fs().closed();
        Ok(())
    }

    fn query_info(&self) -> VfsResult<VfsObjInfo> {
        self.handle.info()
    }
}

impl VfsDirOps for MemDir {
    fn traversal_open(&self, volume: Option<&VfsVolume>, name: &str) -> VfsResult<TraversalEntry> {
        let state = self.fs().state.read();
        let child = state.lookup(self.node(), name)?;
        match &state.get(child, "mem.traversal_open")?.kind {
            NodeKind::Dir { .. } => MemDir::open(self.fs(), child, volume).map(TraversalEntry::Dir),
            NodeKind::Symlink { .. } => {
                MemSymlink::open(self.fs(), child, volume).map(TraversalEntry::Symlink)
            }
            NodeKind::Mount(mounted) => Ok(TraversalEntry::Mount(mounted.clone())),
            NodeKind::File { .. } => Err(VfsError::new(
                VfsErrorKind::NotDir,
                "mem.traversal_open.file",
            )),
        }
    }

    fn open_file(
        &self,
        volume: Option<&VfsVolume>,
        name: &str,
        flags: OpenFlags,
        mode: u32,
    ) -> VfsResult<VfsFile> {
        let fs = self.fs();
        let mut state = fs.state.write();
        let child = match state.lookup(self.node(), name) {
            Ok(child) => {
                if flags.contains(OpenFlags::CREATE | OpenFlags::EXCLUSIVE) {
                    return Err(VfsError::new(VfsErrorKind::AlreadyExists, "mem.open_file.exists"));
                }
                let old_len = match &state.get(child, "mem.open_file")?.kind {
                    NodeKind::File { data } => data.len(),
                    NodeKind::Dir { .. } | NodeKind::Mount(_) => {
                        return Err(VfsError::new(VfsErrorKind::IsDir, "mem.open_file.dir"));
                    }
                    NodeKind::Symlink { .. } => {
                        return Err(VfsError::new(
                            VfsErrorKind::InvalidInput,
                            "mem.open_file.symlink",
                        ));
                    }
                };
                if flags.contains(OpenFlags::TRUNCATE) && flags.wants_write() && old_len > 0 {
                    state.resize_file(&fs.config, child, 0, "mem.open_file")?;
                }
                child
            }
            Err(err)
                if err.kind() == VfsErrorKind::FileNotFound && flags.contains(OpenFlags::CREATE) =>
            {
                let kind = NodeKind::File { data: Vec::new() };
                state.insert(&fs.config, self.node(), name, kind, mode)?
            }
            Err(err) => return Err(err),
        };
        drop(state);
        MemFile::open(fs, child, flags, volume)
    }

    fn create_dir(&self, volume: Option<&VfsVolume>, name: &str, mode: u32) -> VfsResult<VfsDir> {
        let fs = self.fs();
        let child = fs.state.write().insert(
            &fs.config,
            self.node(),
            name,
            NodeKind::Dir { entries: Vec::new() },
            mode,
        )?;
        MemDir::open(fs, child, volume)
    }

    fn open_symlink(&self, volume: Option<&VfsVolume>, name: &str) -> VfsResult<VfsSymlink> {
        let state = self.fs().state.read();
        let child = state.lookup(self.node(), name)?;
        match state.get(child, "mem.open_symlink")?.kind {
            NodeKind::Symlink { .. } => MemSymlink::open(self.fs(), child, volume),
            _ => Err(VfsError::new(VfsErrorKind::NotSymlink, "mem.open_symlink")),
        }
    }

    fn create_symlink(
        &self,
        volume: Option<&VfsVolume>,
        name: &str,
        target: &str,
    ) -> VfsResult<VfsSymlink> {
        let fs = self.fs();
        let child = fs.state.write().insert(
            &fs.config,
            self.node(),
            name,
            NodeKind::Symlink {
                target: target.to_owned(),
            },
            0o777,
        )?;
        MemSymlink::open(fs, child, volume)
    }

    fn query_entry_info(&self, name: &str) -> VfsResult<VfsObjInfo> {
        let state = self.fs().state.read();
        let child = state.lookup(self.node(), name)?;
        Ok(state.get(child, "mem.query_entry_info")?.info(child.ino))
    }

    fn unlink_entry(&self, name: &str) -> VfsResult<()> {
        let removed = self.fs().state.write().remove(self.node(), name)?;
        // Mounted volumes must not share this volume's lock: a removed mount
        // point drops its volume here.
        drop(removed);
        Ok(())
    }

    fn read_dir(&self) -> VfsResult<Option<VfsDirEntry>> {
        let state = self.fs().state.read();
        let mut entries: Vec<_> = state.entries(self.node())?.iter().collect();
        if self.fs().config.deterministic_readdir {
            entries.sort_by(|a, b| a.0.cmp(&b.0));
        }
        let mut cursor = self.cursor.lock();
        let Some((name, child)) = entries.get(*cursor) else {
            return Ok(None);
        };
        *cursor += 1;
        let node = state.get(*child, "mem.read_dir")?;
        Ok(Some(VfsDirEntry {
            name: name.clone(),
            file_type: node.file_type(),
            inode: child.ino as u64 + 1,
        }))
    }

    fn rewind_dir(&self) -> VfsResult<()> {
        *self.cursor.lock() = 0;
        Ok(())
    }

    fn set_ops(&self) -> Option<&dyn VfsObjSetOps> {
        Some(&self.handle)
    }
}
