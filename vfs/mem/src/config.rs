use vfsobj_core::VfsLockKind;

#[derive(Clone, Debug)]
pub struct MemFsConfig {
    /// Cap on file data held by the filesystem; growth past it fails with
    /// `NoMemory`.
    pub max_bytes: Option<u64>,
    /// Cap on live nodes, the root included.
    pub max_inodes: Option<u64>,
    /// Enumerate directories sorted by name instead of in creation order.
    pub deterministic_readdir: bool,
    /// Lock shared by the volume and every object opened through it.
    pub lock_kind: VfsLockKind,
}

impl Default for MemFsConfig {
    fn default() -> Self {
        Self {
            max_bytes: None,
            max_inodes: None,
            deterministic_readdir: true,
            lock_kind: VfsLockKind::ReadWrite,
        }
    }
}
