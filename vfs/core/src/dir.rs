//! Directory handles and the backend directory contract.

use crate::file::VfsFile;
use crate::flags::OpenFlags;
use crate::info::{VfsFileType, VfsObjInfo, VfsObjType};
use crate::lock::LockPolicy;
use crate::obj::{ObjCore, VfsObjOps, VfsObjSetOps, impl_handle};
use crate::symlink::VfsSymlink;
use crate::volume::VfsVolume;
use crate::{VfsError, VfsErrorKind, VfsResult};
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VfsDirEntry {
    pub name: String,
    pub file_type: VfsFileType,
    pub inode: u64,
}

/// What a directory resolves a single name to during traversal.
pub enum TraversalEntry {
    Dir(VfsDir),
    Symlink(VfsSymlink),
    /// Root of another volume mounted at this name.
    Mount(VfsVolume),
}

impl fmt::Debug for TraversalEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraversalEntry::Dir(dir) => f.debug_tuple("Dir").field(dir).finish(),
            TraversalEntry::Symlink(link) => f.debug_tuple("Symlink").field(link).finish(),
            TraversalEntry::Mount(volume) => f.debug_tuple("Mount").field(volume).finish(),
        }
    }
}

/// Backend directory callbacks.
///
/// Every method receives the volume the directory belongs to so new handles
/// can name it as their owner. Lookups run under the read lock, mutations
/// under the write lock. A backend must not drop a handle that shares its
/// lock from inside a callback; build returned handles last.
pub trait VfsDirOps: VfsObjOps {
    /// Resolve one name. Not found is reported as `FileNotFound`,
    /// `PathNotFound` or `NotDir`; regular files are `NotDir` when
    /// traversal passes through them.
    fn traversal_open(&self, volume: Option<&VfsVolume>, name: &str) -> VfsResult<TraversalEntry>;

    fn open_file(
        &self,
        _volume: Option<&VfsVolume>,
        _name: &str,
        _flags: OpenFlags,
        _mode: u32,
    ) -> VfsResult<VfsFile> {
        Err(VfsError::new(VfsErrorKind::NotSupported, "dir.open_file"))
    }

    fn create_dir(
        &self,
        _volume: Option<&VfsVolume>,
        _name: &str,
        _mode: u32,
    ) -> VfsResult<VfsDir> {
        Err(VfsError::new(VfsErrorKind::NotSupported, "dir.create_dir"))
    }

    fn open_symlink(&self, _volume: Option<&VfsVolume>, _name: &str) -> VfsResult<VfsSymlink> {
        Err(VfsError::new(VfsErrorKind::NotSupported, "dir.open_symlink"))
    }

    fn create_symlink(
        &self,
        _volume: Option<&VfsVolume>,
        _name: &str,
        _target: &str,
    ) -> VfsResult<VfsSymlink> {
        Err(VfsError::new(VfsErrorKind::NotSupported, "dir.create_symlink"))
    }

    /// Metadata of a child without following a final symlink.
    fn query_entry_info(&self, _name: &str) -> VfsResult<VfsObjInfo> {
        Err(VfsError::new(VfsErrorKind::NotSupported, "dir.query_entry_info"))
    }

    fn unlink_entry(&self, _name: &str) -> VfsResult<()> {
        Err(VfsError::new(VfsErrorKind::NotSupported, "dir.unlink_entry"))
    }

    /// Next entry of the enumeration, `None` once exhausted.
    fn read_dir(&self) -> VfsResult<Option<VfsDirEntry>> {
        Err(VfsError::new(VfsErrorKind::NotSupported, "dir.read_dir"))
    }

    fn rewind_dir(&self) -> VfsResult<()> {
        Err(VfsError::new(VfsErrorKind::NotSupported, "dir.rewind_dir"))
    }

    fn set_ops(&self) -> Option<&dyn VfsObjSetOps> {
        None
    }
}

#[derive(Clone)]
pub struct VfsDir {
    pub(crate) core: Arc<ObjCore<dyn VfsDirOps>>,
}

impl_handle!(VfsDir, VfsDirOps, Dir);

impl VfsDir {
    pub fn new<T: VfsDirOps>(
        ops: T,
        volume: Option<&VfsVolume>,
        lock: LockPolicy,
    ) -> VfsResult<Self> {
        let core: Arc<ObjCore<dyn VfsDirOps>> =
            ObjCore::create(ops, VfsObjType::Directory, volume, lock)?;
        Ok(Self { core })
    }

    pub fn traversal_open(&self, name: &str) -> VfsResult<TraversalEntry> {
        self.core.with_read("dir.traversal_open", |ops| {
            ops.traversal_open(self.core.volume(), name)
        })
    }

    /// Open a child directory, entering mounted volumes. Symlinks are not
    /// followed.
    pub fn open_dir(&self, name: &str) -> VfsResult<VfsDir> {
        match self.traversal_open(name)? {
            TraversalEntry::Dir(dir) => Ok(dir),
            TraversalEntry::Mount(volume) => volume.open_root(),
            TraversalEntry::Symlink(_) => {
                Err(VfsError::new(VfsErrorKind::NotDir, "dir.open_dir.symlink"))
            }
        }
    }

    pub fn open_file(&self, name: &str, flags: OpenFlags, mode: u32) -> VfsResult<VfsFile> {
        let volume = self.core.volume();
        if flags.contains(OpenFlags::CREATE) {
            self.core.with_write("dir.open_file", |ops| {
                ops.open_file(volume, name, flags, mode)
            })
        } else {
            self.core.with_read("dir.open_file", |ops| {
                ops.open_file(volume, name, flags, mode)
            })
        }
    }

    pub fn create_dir(&self, name: &str, mode: u32) -> VfsResult<VfsDir> {
        self.core.with_write("dir.create_dir", |ops| {
            ops.create_dir(self.core.volume(), name, mode)
        })
    }

    pub fn open_symlink(&self, name: &str) -> VfsResult<VfsSymlink> {
        self.core.with_read("dir.open_symlink", |ops| {
            ops.open_symlink(self.core.volume(), name)
        })
    }

    pub fn create_symlink(&self, name: &str, target: &str) -> VfsResult<VfsSymlink> {
        self.core.with_write("dir.create_symlink", |ops| {
            ops.create_symlink(self.core.volume(), name, target)
        })
    }

    pub fn query_entry_info(&self, name: &str) -> VfsResult<VfsObjInfo> {
        self.core.with_read("dir.query_entry_info", |ops| ops.query_entry_info(name))
    }

    pub fn unlink_entry(&self, name: &str) -> VfsResult<()> {
        self.core.with_write("dir.unlink_entry", |ops| ops.unlink_entry(name))
    }

    pub fn read_dir(&self) -> VfsResult<Option<VfsDirEntry>> {
        self.core.with_write("dir.read_dir", |ops| ops.read_dir())
    }

    pub fn rewind_dir(&self) -> VfsResult<()> {
        self.core.with_write("dir.rewind_dir", |ops| ops.rewind_dir())
    }

    /// Collect the remaining entries of the enumeration.
    pub fn entries(&self) -> VfsResult<Vec<VfsDirEntry>> {
        let mut out = Vec::new();
        while let Some(entry) = self.read_dir()? {
            out.push(entry);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VfsObj;
    use crate::flags::VfsOpsFeatures;
    use crate::obj::VfsOpsDescriptor;

    static LEAF_OPS: VfsOpsDescriptor =
        VfsOpsDescriptor::new("test-leaf-dir", VfsObjType::Directory, VfsOpsFeatures::empty());

    struct LeafDir;

    impl VfsObjOps for LeafDir {
        fn descriptor(&self) -> &'static VfsOpsDescriptor {
            &LEAF_OPS
        }

        fn close(&self) -> VfsResult<()> {
            Ok(())
        }

        fn query_info(&self) -> VfsResult<VfsObjInfo> {
            Ok(VfsObjInfo::new(VfsFileType::Directory))
        }
    }

    impl VfsDirOps for LeafDir {
        fn traversal_open(
            &self,
            volume: Option<&VfsVolume>,
            name: &str,
        ) -> VfsResult<TraversalEntry> {
            if name == "child" {
                Ok(TraversalEntry::Dir(VfsDir::new(LeafDir, volume, LockPolicy::Inherit)?))
            } else {
                Err(VfsError::new(VfsErrorKind::FileNotFound, "test.lookup"))
            }
        }
    }

    #[test]
    fn optional_callbacks_default_to_not_supported() {
        let dir = VfsDir::new(LeafDir, None, LockPolicy::None).unwrap();
        let err = dir.create_dir("x", 0o755).unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::NotSupported);
        assert_eq!(err.context(), "dir.create_dir");
        assert_eq!(dir.read_dir().unwrap_err().kind(), VfsErrorKind::NotSupported);
        assert_eq!(
            dir.to_obj().set_mode(0o700, 0o777).unwrap_err().kind(),
            VfsErrorKind::NotSupported
        );
    }

    #[test]
    fn open_dir_goes_through_traversal_open() {
        let dir = VfsDir::new(LeafDir, None, LockPolicy::NewReadWrite).unwrap();
        let child = dir.open_dir("child").unwrap();
        assert!(!child.same_object(&dir));
        assert!(child.lock().is_none());
        assert_eq!(
            dir.open_dir("missing").unwrap_err().kind(),
            VfsErrorKind::FileNotFound
        );
    }

    #[test]
    fn downcast_and_upcast_round_trip() {
        let dir = VfsDir::new(LeafDir, None, LockPolicy::None).unwrap();
        let obj = VfsObj::from_dir(&dir);
        assert_eq!(dir.ref_count(), 2);
        assert!(obj.to_file().is_none());
        assert!(obj.to_symlink().is_none());
        let back = obj.to_dir().expect("directory object");
        assert!(back.same_object(&dir));
        assert!(back.instance::<LeafDir>().is_some());
        assert_eq!(dir.ref_count(), 3);
    }
}
