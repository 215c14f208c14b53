//! The base object shared by every handle kind.
//!
//! Each handle points at one `Arc<ObjCore<dyn KindOps>>` allocation holding
//! the header (validity tag, lock, owning volume) followed by the backend
//! instance. Cloning a handle retains the object; dropping the last handle
//! tears it down exactly once: the tombstone is written under the write
//! lock, then the backend's `close` callback runs.

use crate::dir::{VfsDir, VfsDirOps};
use crate::file::{VfsFile, VfsFileOps};
use crate::flags::VfsOpsFeatures;
use crate::fs_stream::{VfsFsStream, VfsFsStreamOps};
use crate::info::{VfsObjInfo, VfsObjType, VfsSetTimes};
use crate::io::{VfsIoStream, WeakIoCore};
use crate::lock::{LockPolicy, VfsLock};
use crate::symlink::{VfsSymlink, VfsSymlinkOps};
use crate::volume::{VfsVolume, VfsVolumeOps};
use crate::{VfsError, VfsErrorKind, VfsResult};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use tracing::warn;

/// Version every operations table must carry in both `version` and
/// `end_marker`.
pub const VFS_OPS_VERSION: u32 = 0x0001_0000;

pub(crate) const OBJ_MAGIC: u32 = 0x1966_1201;
pub(crate) const OBJ_MAGIC_DEAD: u32 = 0x2001_0523;

pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T> AsAny for T
where
    T: Any,
{
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Static description of a backend operations table.
///
/// The leading `version` and trailing `end_marker` must both equal
/// [`VFS_OPS_VERSION`]; `obj_type` must match the handle kind the table is
/// used to construct.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VfsOpsDescriptor {
    pub version: u32,
    pub obj_type: VfsObjType,
    pub name: &'static str,
    pub features: VfsOpsFeatures,
    pub end_marker: u32,
}

impl VfsOpsDescriptor {
    pub const fn new(name: &'static str, obj_type: VfsObjType, features: VfsOpsFeatures) -> Self {
        Self {
            version: VFS_OPS_VERSION,
            obj_type,
            name,
            features,
            end_marker: VFS_OPS_VERSION,
        }
    }

    fn validate(&self, expected: VfsObjType) -> VfsResult<()> {
        if self.version != VFS_OPS_VERSION || self.end_marker != VFS_OPS_VERSION {
            warn!(
                ops = self.name,
                version = self.version,
                end_marker = self.end_marker,
                expected = VFS_OPS_VERSION,
                "rejecting operations table with unknown version"
            );
            return Err(VfsError::new(VfsErrorKind::VersionMismatch, "obj.new.version"));
        }
        if self.obj_type != expected {
            warn!(
                ops = self.name,
                declared = self.obj_type.as_str(),
                expected = expected.as_str(),
                "operations table declares the wrong object type"
            );
            return Err(VfsError::new(VfsErrorKind::InvalidInput, "obj.new.type"));
        }
        Ok(())
    }
}

/// Callbacks every object kind provides.
pub trait VfsObjOps: AsAny + Send + Sync + 'static {
    fn descriptor(&self) -> &'static VfsOpsDescriptor;

    /// Called once, when the last reference is released. Errors are logged;
    /// the object is gone either way.
    fn close(&self) -> VfsResult<()>;

    fn query_info(&self) -> VfsResult<VfsObjInfo>;
}

/// Object-mutation callbacks (mode, timestamps, ownership).
pub trait VfsObjSetOps: Send + Sync {
    /// Replace the mode bits selected by `mask` with those of `mode`.
    fn set_mode(&self, mode: u32, mask: u32) -> VfsResult<()>;
    fn set_times(&self, times: VfsSetTimes) -> VfsResult<()>;
    /// `None` leaves the id unchanged.
    fn set_owner(&self, uid: Option<u32>, gid: Option<u32>) -> VfsResult<()>;
}

pub(crate) struct ObjCore<O: ?Sized + VfsObjOps> {
    magic: AtomicU32,
    lock: Option<VfsLock>,
    volume: Option<VfsVolume>,
    ops: O,
}

impl<O: VfsObjOps> ObjCore<O> {
    pub(crate) fn create(
        ops: O,
        expected: VfsObjType,
        volume: Option<&VfsVolume>,
        lock: LockPolicy,
    ) -> VfsResult<Arc<Self>> {
        ops.descriptor().validate(expected)?;
        let lock = lock.resolve(volume.and_then(VfsVolume::lock));
        Ok(Arc::new(Self {
            magic: AtomicU32::new(OBJ_MAGIC),
            lock,
            volume: volume.cloned(),
            ops,
        }))
    }
}

impl<O: ?Sized + VfsObjOps> ObjCore<O> {
    pub(crate) fn ops(&self) -> &O {
        &self.ops
    }

    pub(crate) fn lock(&self) -> Option<&VfsLock> {
        self.lock.as_ref()
    }

    pub(crate) fn volume(&self) -> Option<&VfsVolume> {
        self.volume.as_ref()
    }

    pub(crate) fn features(&self) -> VfsOpsFeatures {
        self.ops.descriptor().features
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.magic.load(Ordering::Acquire) == OBJ_MAGIC
    }

    fn ensure_alive(&self, context: &'static str) -> VfsResult<()> {
        let alive = self.is_alive();
        debug_assert!(alive, "{context}: object used after release");
        if alive {
            Ok(())
        } else {
            Err(VfsError::new(VfsErrorKind::InvalidHandle, context))
        }
    }

    /// Run one callback under the object's read lock.
    pub(crate) fn with_read<R>(
        &self,
        context: &'static str,
        f: impl FnOnce(&O) -> VfsResult<R>,
    ) -> VfsResult<R> {
        self.ensure_alive(context)?;
        let _guard = self.lock.as_ref().map(VfsLock::acquire_read);
        f(&self.ops)
    }

    /// Run one callback under the object's write lock.
    pub(crate) fn with_write<R>(
        &self,
        context: &'static str,
        f: impl FnOnce(&O) -> VfsResult<R>,
    ) -> VfsResult<R> {
        self.ensure_alive(context)?;
        let _guard = self.lock.as_ref().map(VfsLock::acquire_write);
        f(&self.ops)
    }

    pub(crate) fn query_info(&self) -> VfsResult<VfsObjInfo> {
        self.with_read("obj.query_info", |ops| ops.query_info())
    }

    pub(crate) fn instance<T: 'static>(&self) -> Option<&T> {
        self.ops.as_any().downcast_ref::<T>()
    }
}

impl<O: ?Sized + VfsObjOps> Drop for ObjCore<O> {
    fn drop(&mut self) {
        {
            let _guard = self.lock.as_ref().map(VfsLock::acquire_write);
            self.magic.store(OBJ_MAGIC_DEAD, Ordering::Release);
        }
        if let Err(err) = self.ops.close() {
            warn!(ops = self.ops.descriptor().name, error = %err, "close callback failed");
        }
    }
}

/// Address of the shared allocation, for identity comparisons.
pub(crate) fn core_addr<O: ?Sized + VfsObjOps>(core: &Arc<ObjCore<O>>) -> usize {
    Arc::as_ptr(core) as *const u8 as usize
}

/// Implements the handle surface shared by the single-core handle kinds.
macro_rules! impl_handle {
    ($handle:ident, $ops:ident, $variant:ident) => {
        impl $handle {
            /// Take another reference to the same object.
            pub fn retain(&self) -> Self {
                self.clone()
            }

            /// Drop this reference and return how many remain (a snapshot;
            /// other threads may retain or release concurrently).
            pub fn release(self) -> usize {
                let remaining = ::std::sync::Arc::strong_count(&self.core).saturating_sub(1);
                drop(self);
                remaining
            }

            pub fn ref_count(&self) -> usize {
                ::std::sync::Arc::strong_count(&self.core)
            }

            pub fn query_info(&self) -> $crate::VfsResult<$crate::VfsObjInfo> {
                self.core.query_info()
            }

            pub fn lock(&self) -> Option<&$crate::VfsLock> {
                self.core.lock()
            }

            /// The volume this object belongs to, if any.
            pub fn volume(&self) -> Option<&$crate::VfsVolume> {
                self.core.volume()
            }

            /// The backend instance, if it is of type `T`.
            pub fn instance<T: 'static>(&self) -> Option<&T> {
                self.core.instance::<T>()
            }

            pub fn descriptor(&self) -> &'static $crate::VfsOpsDescriptor {
                self.core.ops().descriptor()
            }

            pub fn to_obj(&self) -> $crate::VfsObj {
                $crate::VfsObj::$variant(self.clone())
            }

            pub fn same_object(&self, other: &Self) -> bool {
                ::std::sync::Arc::ptr_eq(&self.core, &other.core)
            }

            pub(crate) fn from_core(
                core: ::std::sync::Arc<$crate::obj::ObjCore<dyn $ops>>,
            ) -> Self {
                Self { core }
            }

            pub(crate) fn addr(&self) -> usize {
                $crate::obj::core_addr(&self.core)
            }

            pub(crate) fn downgrade_core(
                &self,
            ) -> ::std::sync::Weak<$crate::obj::ObjCore<dyn $ops>> {
                ::std::sync::Arc::downgrade(&self.core)
            }
        }

        impl ::std::fmt::Debug for $handle {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_struct(stringify!($handle))
                    .field("ops", &self.descriptor().name)
                    .field("refs", &self.ref_count())
                    .finish()
            }
        }

        impl From<$handle> for $crate::VfsObj {
            fn from(handle: $handle) -> Self {
                $crate::VfsObj::$variant(handle)
            }
        }
    };
}

pub(crate) use impl_handle;

/// A handle of any kind; the safe replacement for a generic base handle.
#[derive(Clone, Debug)]
pub enum VfsObj {
    Volume(VfsVolume),
    Dir(VfsDir),
    Symlink(VfsSymlink),
    /// A plain I/O stream. Files always use [`VfsObj::File`].
    IoStream(VfsIoStream),
    File(VfsFile),
    FsStream(VfsFsStream),
}

impl VfsObj {
    pub fn obj_type(&self) -> VfsObjType {
        match self {
            VfsObj::Volume(_) => VfsObjType::Volume,
            VfsObj::Dir(_) => VfsObjType::Directory,
            VfsObj::Symlink(_) => VfsObjType::Symlink,
            VfsObj::IoStream(_) => VfsObjType::IoStream,
            VfsObj::File(_) => VfsObjType::File,
            VfsObj::FsStream(_) => VfsObjType::FsStream,
        }
    }

    pub fn retain(&self) -> Self {
        self.clone()
    }

    pub fn release(self) -> usize {
        match self {
            VfsObj::Volume(h) => h.release(),
            VfsObj::Dir(h) => h.release(),
            VfsObj::Symlink(h) => h.release(),
            VfsObj::IoStream(h) => h.release(),
            VfsObj::File(h) => h.release(),
            VfsObj::FsStream(h) => h.release(),
        }
    }

    pub fn ref_count(&self) -> usize {
        match self {
            VfsObj::Volume(h) => h.ref_count(),
            VfsObj::Dir(h) => h.ref_count(),
            VfsObj::Symlink(h) => h.ref_count(),
            VfsObj::IoStream(h) => h.ref_count(),
            VfsObj::File(h) => h.ref_count(),
            VfsObj::FsStream(h) => h.ref_count(),
        }
    }

    pub fn query_info(&self) -> VfsResult<VfsObjInfo> {
        match self {
            VfsObj::Volume(h) => h.query_info(),
            VfsObj::Dir(h) => h.query_info(),
            VfsObj::Symlink(h) => h.query_info(),
            VfsObj::IoStream(h) => h.query_info(),
            VfsObj::File(h) => h.query_info(),
            VfsObj::FsStream(h) => h.query_info(),
        }
    }

    pub fn same_object(&self, other: &VfsObj) -> bool {
        self.addr() == other.addr()
    }

    fn addr(&self) -> usize {
        match self {
            VfsObj::Volume(h) => h.addr(),
            VfsObj::Dir(h) => h.addr(),
            VfsObj::Symlink(h) => h.addr(),
            VfsObj::IoStream(h) => h.addr(),
            VfsObj::File(h) => h.addr(),
            VfsObj::FsStream(h) => h.addr(),
        }
    }

    pub fn to_volume(&self) -> Option<VfsVolume> {
        match self {
            VfsObj::Volume(h) => Some(h.clone()),
            _ => None,
        }
    }

    pub fn to_dir(&self) -> Option<VfsDir> {
        match self {
            VfsObj::Dir(h) => Some(h.clone()),
            _ => None,
        }
    }

    pub fn to_symlink(&self) -> Option<VfsSymlink> {
        match self {
            VfsObj::Symlink(h) => Some(h.clone()),
            _ => None,
        }
    }

    /// Files are I/O streams too, so this succeeds for both kinds.
    pub fn to_io_stream(&self) -> Option<VfsIoStream> {
        match self {
            VfsObj::IoStream(h) => Some(h.clone()),
            VfsObj::File(h) => Some(h.to_io_stream()),
            _ => None,
        }
    }

    pub fn to_file(&self) -> Option<VfsFile> {
        match self {
            VfsObj::File(h) => Some(h.clone()),
            _ => None,
        }
    }

    pub fn to_fs_stream(&self) -> Option<VfsFsStream> {
        match self {
            VfsObj::FsStream(h) => Some(h.clone()),
            _ => None,
        }
    }

    pub fn from_volume(volume: &VfsVolume) -> Self {
        VfsObj::Volume(volume.clone())
    }

    pub fn from_dir(dir: &VfsDir) -> Self {
        VfsObj::Dir(dir.clone())
    }

    pub fn from_symlink(symlink: &VfsSymlink) -> Self {
        VfsObj::Symlink(symlink.clone())
    }

    /// A stream that is really a file comes back as [`VfsObj::File`].
    pub fn from_io_stream(stream: &VfsIoStream) -> Self {
        match stream.to_file() {
            Some(file) => VfsObj::File(file),
            None => VfsObj::IoStream(stream.clone()),
        }
    }

    pub fn from_file(file: &VfsFile) -> Self {
        VfsObj::File(file.clone())
    }

    pub fn from_fs_stream(stream: &VfsFsStream) -> Self {
        VfsObj::FsStream(stream.clone())
    }

    /// The volume this object belongs to, if it has one.
    pub fn volume(&self) -> Option<VfsVolume> {
        match self {
            VfsObj::Volume(_) => None,
            VfsObj::Dir(h) => h.volume().cloned(),
            VfsObj::Symlink(h) => h.volume().cloned(),
            VfsObj::IoStream(h) => h.volume().cloned(),
            VfsObj::File(h) => h.volume().cloned(),
            VfsObj::FsStream(h) => h.volume().cloned(),
        }
    }

    pub fn set_mode(&self, mode: u32, mask: u32) -> VfsResult<()> {
        self.with_set_ops("obj.set_mode", |ops| ops.set_mode(mode, mask))
    }

    pub fn set_times(&self, times: VfsSetTimes) -> VfsResult<()> {
        self.with_set_ops("obj.set_times", |ops| ops.set_times(times))
    }

    pub fn set_owner(&self, uid: Option<u32>, gid: Option<u32>) -> VfsResult<()> {
        self.with_set_ops("obj.set_owner", |ops| ops.set_owner(uid, gid))
    }

    fn with_set_ops(
        &self,
        context: &'static str,
        f: impl FnOnce(&dyn VfsObjSetOps) -> VfsResult<()>,
    ) -> VfsResult<()> {
        let unsupported = VfsError::new(VfsErrorKind::NotSupported, context);
        match self {
            VfsObj::Symlink(h) => h.core.with_write(context, |ops| f(ops)),
            VfsObj::Dir(h) => h
                .core
                .with_write(context, |ops| ops.set_ops().map_or(Err(unsupported), f)),
            VfsObj::File(h) => h
                .core
                .with_write(context, |ops| ops.set_ops().map_or(Err(unsupported), f)),
            VfsObj::IoStream(h) => match h.to_file() {
                Some(file) => VfsObj::File(file).with_set_ops(context, f),
                None => Err(unsupported),
            },
            VfsObj::Volume(_) | VfsObj::FsStream(_) => Err(unsupported),
        }
    }

    pub fn downgrade(&self) -> WeakVfsObj {
        let inner = match self {
            VfsObj::Volume(h) => WeakInner::Volume(h.downgrade_core()),
            VfsObj::Dir(h) => WeakInner::Dir(h.downgrade_core()),
            VfsObj::Symlink(h) => WeakInner::Symlink(h.downgrade_core()),
            VfsObj::IoStream(h) => WeakInner::IoStream(h.downgrade_core()),
            VfsObj::File(h) => WeakInner::File(h.downgrade_core()),
            VfsObj::FsStream(h) => WeakInner::FsStream(h.downgrade_core()),
        };
        WeakVfsObj { inner }
    }
}

/// Non-owning reference; does not keep the object alive.
#[derive(Clone)]
pub struct WeakVfsObj {
    inner: WeakInner,
}

#[derive(Clone)]
enum WeakInner {
    Volume(Weak<ObjCore<dyn VfsVolumeOps>>),
    Dir(Weak<ObjCore<dyn VfsDirOps>>),
    Symlink(Weak<ObjCore<dyn VfsSymlinkOps>>),
    IoStream(WeakIoCore),
    File(Weak<ObjCore<dyn VfsFileOps>>),
    FsStream(Weak<ObjCore<dyn VfsFsStreamOps>>),
}

impl WeakVfsObj {
    /// Retain the object again, or fail with `InvalidHandle` once it has
    /// been torn down.
    pub fn upgrade(&self) -> VfsResult<VfsObj> {
        let dead = || VfsError::new(VfsErrorKind::InvalidHandle, "obj.upgrade");
        let obj = match &self.inner {
            WeakInner::Volume(w) => {
                VfsObj::Volume(VfsVolume::from_core(w.upgrade().ok_or_else(dead)?))
            }
            WeakInner::Dir(w) => VfsObj::Dir(VfsDir::from_core(w.upgrade().ok_or_else(dead)?)),
            WeakInner::Symlink(w) => {
                VfsObj::Symlink(VfsSymlink::from_core(w.upgrade().ok_or_else(dead)?))
            }
            WeakInner::IoStream(w) => {
                VfsObj::IoStream(VfsIoStream::from_io_core(w.upgrade().ok_or_else(dead)?))
            }
            WeakInner::File(w) => {
                VfsObj::File(VfsFile::from_core(w.upgrade().ok_or_else(dead)?))
            }
            WeakInner::FsStream(w) => {
                VfsObj::FsStream(VfsFsStream::from_core(w.upgrade().ok_or_else(dead)?))
            }
        };
        Ok(obj)
    }

    pub fn is_closed(&self) -> bool {
        match &self.inner {
            WeakInner::Volume(w) => w.strong_count() == 0,
            WeakInner::Dir(w) => w.strong_count() == 0,
            WeakInner::Symlink(w) => w.strong_count() == 0,
            WeakInner::IoStream(w) => w.strong_count() == 0,
            WeakInner::File(w) => w.strong_count() == 0,
            WeakInner::FsStream(w) => w.strong_count() == 0,
        }
    }
}

impl fmt::Debug for WeakVfsObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakVfsObj")
            .field("closed", &self.is_closed())
            .finish()
    }
}
