//! The node table and the volume object.

use crate::config::MemFsConfig;
use crate::dir::MemDir;
use parking_lot::RwLock;
use slab::Slab;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, trace};
use vfsobj_core::{
    LockPolicy, ParsedPath, VfsDir, VfsError, VfsErrorKind, VfsFileMode, VfsFileType, VfsObjInfo,
    VfsObjOps, VfsObjSetOps, VfsObjType, VfsOpsDescriptor, VfsOpsFeatures, VfsResult,
    VfsSetTimes, VfsTimespec, VfsVolume, VfsVolumeOps,
};

/// Slab slot plus the generation it was allocated with; a stale reference
/// to a reused slot is detected instead of aliasing the new node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct NodeRef {
    pub(crate) ino: usize,
    pub(crate) generation: u64,
}

pub(crate) enum NodeKind {
    Dir { entries: Vec<(String, NodeRef)> },
    File { data: Vec<u8> },
    Symlink { target: String },
    Mount(VfsVolume),
}

pub(crate) struct Node {
    generation: u64,
    pub(crate) kind: NodeKind,
    pub(crate) mode: VfsFileMode,
    pub(crate) uid: u32,
    pub(crate) gid: u32,
    pub(crate) atime: VfsTimespec,
    pub(crate) mtime: VfsTimespec,
    pub(crate) ctime: VfsTimespec,
    pub(crate) btime: VfsTimespec,
}

impl Node {
    fn new(kind: NodeKind, mode: u32, generation: u64) -> Self {
        let now = VfsTimespec::now();
        Self {
            generation,
            kind,
            mode: VfsFileMode(mode & VfsFileMode::PERMISSION_MASK),
            uid: 0,
            gid: 0,
            atime: now,
            mtime: now,
            ctime: now,
            btime: now,
        }
    }

    pub(crate) fn file_type(&self) -> VfsFileType {
        match self.kind {
            NodeKind::Dir { .. } | NodeKind::Mount(_) => VfsFileType::Directory,
            NodeKind::File { .. } => VfsFileType::RegularFile,
            NodeKind::Symlink { .. } => VfsFileType::Symlink,
        }
    }

    pub(crate) fn info(&self, ino: usize) -> VfsObjInfo {
        let (size, nlink) = match &self.kind {
            NodeKind::Dir { entries } => (entries.len() as u64, 2),
            NodeKind::File { data } => (data.len() as u64, 1),
            NodeKind::Symlink { target } => (target.len() as u64, 1),
            NodeKind::Mount(_) => (0, 2),
        };
        VfsObjInfo {
            mode: self.mode,
            size,
            allocated: size,
            nlink,
            uid: self.uid,
            gid: self.gid,
            inode: ino as u64 + 1,
            atime: self.atime,
            mtime: self.mtime,
            ctime: self.ctime,
            btime: self.btime,
            ..VfsObjInfo::new(self.file_type())
        }
    }
}

pub(crate) struct MemFsState {
    nodes: Slab<Node>,
    bytes_used: u64,
    next_generation: u64,
}

impl MemFsState {
    pub(crate) fn get(&self, node: NodeRef, context: &'static str) -> VfsResult<&Node> {
        self.nodes
            .get(node.ino)
            .filter(|found| found.generation == node.generation)
            .ok_or(VfsError::new(VfsErrorKind::FileNotFound, context))
    }

    pub(crate) fn get_mut(&mut self, node: NodeRef, context: &'static str) -> VfsResult<&mut Node> {
        self.nodes
            .get_mut(node.ino)
            .filter(|found| found.generation == node.generation)
            .ok_or(VfsError::new(VfsErrorKind::FileNotFound, context))
    }

    pub(crate) fn entries(&self, dir: NodeRef) -> VfsResult<&[(String, NodeRef)]> {
        match &self.get(dir, "mem.dir.stale")?.kind {
            NodeKind::Dir { entries } => Ok(entries),
            _ => Err(VfsError::new(VfsErrorKind::NotDir, "mem.dir.not_dir")),
        }
    }

    pub(crate) fn lookup(&self, dir: NodeRef, name: &str) -> VfsResult<NodeRef> {
        self.entries(dir)?
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, node)| *node)
            .ok_or(VfsError::new(VfsErrorKind::FileNotFound, "mem.lookup"))
    }

    pub(crate) fn insert(
        &mut self,
        config: &MemFsConfig,
        parent: NodeRef,
        name: &str,
        kind: NodeKind,
        mode: u32,
    ) -> VfsResult<NodeRef> {
        if self.lookup(parent, name).is_ok() {
            return Err(VfsError::new(VfsErrorKind::AlreadyExists, "mem.insert.exists"));
        }
        if config
            .max_inodes
            .is_some_and(|max| self.nodes.len() as u64 >= max)
        {
            return Err(VfsError::new(VfsErrorKind::NoMemory, "mem.quota.inodes"));
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        let ino = self.nodes.insert(Node::new(kind, mode, generation));
        let child = NodeRef { ino, generation };
        let now = VfsTimespec::now();
        let parent_node = self.get_mut(parent, "mem.insert.parent")?;
        if let NodeKind::Dir { entries } = &mut parent_node.kind {
            entries.push((name.to_owned(), child));
        }
        parent_node.mtime = now;
        trace!(name, ino, "node created");
        Ok(child)
    }

    /// Detach `name` from `parent` and free its slot. The node is returned
    /// so the caller decides where it is dropped.
    pub(crate) fn remove(&mut self, parent: NodeRef, name: &str) -> VfsResult<Node> {
        let child = self.lookup(parent, name)?;
        if let NodeKind::Dir { entries } = &self.get(child, "mem.remove")?.kind {
            if !entries.is_empty() {
                return Err(VfsError::new(VfsErrorKind::DirNotEmpty, "mem.remove.not_empty"));
            }
        }
        let parent_node = self.get_mut(parent, "mem.remove.parent")?;
        if let NodeKind::Dir { entries } = &mut parent_node.kind {
            entries.retain(|(_, node)| *node != child);
        }
        parent_node.mtime = VfsTimespec::now();
        let node = self.nodes.remove(child.ino);
        if let NodeKind::File { data } = &node.kind {
            self.bytes_used -= data.len() as u64;
        }
        trace!(name, ino = child.ino, "node removed");
        Ok(node)
    }

    /// Set a file's length, zero-filling any growth. A quota or allocation
    /// failure leaves the file as it was.
    pub(crate) fn resize_file(
        &mut self,
        config: &MemFsConfig,
        file: NodeRef,
        new_len: usize,
        context: &'static str,
    ) -> VfsResult<&mut Node> {
        let node = self
            .nodes
            .get_mut(file.ino)
            .filter(|found| found.generation == file.generation)
            .ok_or(VfsError::new(VfsErrorKind::FileNotFound, context))?;
        let NodeKind::File { data } = &mut node.kind else {
            return Err(VfsError::new(VfsErrorKind::Internal, "mem.file.kind"));
        };
        let old_len = data.len();
        let used = (self.bytes_used - old_len as u64).saturating_add(new_len as u64);
        if new_len > old_len {
            if config.max_bytes.is_some_and(|max| used > max) {
                return Err(VfsError::new(VfsErrorKind::NoMemory, "mem.quota.bytes"));
            }
            data
                .try_reserve_exact(new_len - old_len)
                .map_err(|_| VfsError::new(VfsErrorKind::NoMemory, context))?;
        }
        data.resize(new_len, 0);
        self.bytes_used = used;
        Ok(node)
    }
}

pub(crate) struct MemFsInner {
    pub(crate) config: MemFsConfig,
    pub(crate) state: RwLock<MemFsState>,
    pub(crate) root: NodeRef,
    open_objects: AtomicUsize,
}

impl MemFsInner {
    pub(crate) fn opened(&self) {
        self.open_objects.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn closed(&self) {
        self.open_objects.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The part every node-backed object shares: which filesystem, which node.
pub(crate) struct NodeHandle {
    pub(crate) fs: Arc<MemFsInner>,
    pub(crate) node: NodeRef,
}

impl NodeHandle {
    pub(crate) fn new(fs: &Arc<MemFsInner>, node: NodeRef) -> Self {
        Self {
            fs: fs.clone(),
            node,
        }
    }

    pub(crate) fn info(&self) -> VfsResult<VfsObjInfo> {
        let state = self.fs.state.read();
        Ok(state.get(self.node, "mem.query_info")?.info(self.node.ino))
    }

    fn update(&self, context: &'static str, f: impl FnOnce(&mut Node)) -> VfsResult<()> {
        let mut state = self.fs.state.write();
        let node = state.get_mut(self.node, context)?;
        f(node);
        node.ctime = VfsTimespec::now();
        Ok(())
    }
}

impl VfsObjSetOps for NodeHandle {
    fn set_mode(&self, mode: u32, mask: u32) -> VfsResult<()> {
        let mask = mask & VfsFileMode::PERMISSION_MASK;
        self.update("mem.set_mode", |node| node.mode = node.mode.apply(mode, mask))
    }

    fn set_times(&self, times: VfsSetTimes) -> VfsResult<()> {
        self.update("mem.set_times", |node| {
            node.atime = times.atime.unwrap_or(node.atime);
            node.mtime = times.mtime.unwrap_or(node.mtime);
            node.ctime = times.ctime.unwrap_or(node.ctime);
            node.btime = times.btime.unwrap_or(node.btime);
        })
    }

    fn set_owner(&self, uid: Option<u32>, gid: Option<u32>) -> VfsResult<()> {
        self.update("mem.set_owner", |node| {
            node.uid = uid.unwrap_or(node.uid);
            node.gid = gid.unwrap_or(node.gid);
        })
    }
}

static MEM_VOLUME_OPS: VfsOpsDescriptor =
    VfsOpsDescriptor::new("memfs-volume", VfsObjType::Volume, VfsOpsFeatures::empty());

struct MemVolume {
    fs: Arc<MemFsInner>,
}

impl VfsObjOps for MemVolume {
    fn descriptor(&self) -> &'static VfsOpsDescriptor {
        &MEM_VOLUME_OPS
    }

    fn close(&self) -> VfsResult<()> {
        debug!("memfs volume closed");
        Ok(())
    }

    fn query_info(&self) -> VfsResult<VfsObjInfo> {
        NodeHandle::new(&self.fs, self.fs.root).info()
    }
}

impl VfsVolumeOps for MemVolume {
    fn open_root(&self, volume: &VfsVolume) -> VfsResult<VfsDir> {
        MemDir::open(&self.fs, self.fs.root, Some(volume))
    }
}

/// An in-memory filesystem exposed as a [`VfsVolume`].
#[derive(Clone)]
pub struct MemFs {
    inner: Arc<MemFsInner>,
    volume: VfsVolume,
}

impl MemFs {
    pub fn new(config: MemFsConfig) -> VfsResult<Self> {
        let mut nodes = Slab::new();
        let ino = nodes.insert(Node::new(NodeKind::Dir { entries: Vec::new() }, 0o755, 0));
        let lock = LockPolicy::from(config.lock_kind);
        let inner = Arc::new(MemFsInner {
            config,
            state: RwLock::new(MemFsState {
                nodes,
                bytes_used: 0,
                next_generation: 1,
            }),
            root: NodeRef { ino, generation: 0 },
            open_objects: AtomicUsize::new(0),
        });
        let volume = VfsVolume::new(MemVolume { fs: inner.clone() }, lock)?;
        Ok(Self { inner, volume })
    }

    pub fn volume(&self) -> VfsVolume {
        self.volume.clone()
    }

    pub fn config(&self) -> &MemFsConfig {
        &self.inner.config
    }

    /// Mount `volume` at `path`. Intermediate components must be plain
    /// directories; the final one must be missing or an empty directory.
    pub fn mount(&self, path: &str, volume: VfsVolume) -> VfsResult<()> {
        let parsed = ParsedPath::parse(path, None)?;
        let Some(name) = parsed.last() else {
            return Err(VfsError::new(VfsErrorKind::InvalidInput, "mem.mount.root"));
        };
        let mut state = self.inner.state.write();
        let mut parent = self.inner.root;
        for component in parsed.components().take(parsed.len() - 1) {
            let child = state
                .lookup(parent, component)
                .map_err(|_| VfsError::new(VfsErrorKind::PathNotFound, "mem.mount.parent"))?;
            if !matches!(state.get(child, "mem.mount")?.kind, NodeKind::Dir { .. }) {
                return Err(VfsError::new(VfsErrorKind::NotDir, "mem.mount.not_dir"));
            }
            parent = child;
        }
        match state.lookup(parent, name) {
            Ok(existing) => {
                let node = state.get_mut(existing, "mem.mount")?;
                if !matches!(&node.kind, NodeKind::Dir { entries } if entries.is_empty()) {
                    return Err(VfsError::new(VfsErrorKind::AlreadyExists, "mem.mount.busy"));
                }
                node.kind = NodeKind::Mount(volume);
            }
            Err(_) => {
                state.insert(&self.inner.config, parent, name, NodeKind::Mount(volume), 0o755)?;
            }
        }
        debug!(path = parsed.as_str(), "volume mounted");
        Ok(())
    }

    pub fn bytes_used(&self) -> u64 {
        self.inner.state.read().bytes_used
    }

    pub fn node_count(&self) -> usize {
        self.inner.state.read().nodes.len()
    }

    /// Objects opened on this filesystem and not yet closed.
    pub fn open_objects(&self) -> usize {
        self.inner.open_objects.load(Ordering::SeqCst)
    }
}
