//! Uniform acquire/release wrapper over three interchangeable primitives.
//!
//! A [`VfsLock`] is reference counted and may be shared by any number of
//! objects; a whole volume typically runs behind one. The primitive is
//! released when the last reference goes away.

use parking_lot::{
    Mutex, MutexGuard, ReentrantMutex, ReentrantMutexGuard, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VfsLockKind {
    /// Many readers or one writer.
    ReadWrite,
    /// Non-recursive mutex; read and write acquisitions are identical.
    FastMutex,
    /// Recursive mutex; read and write acquisitions are identical.
    Mutex,
}

enum Primitive {
    ReadWrite(RwLock<()>),
    FastMutex(Mutex<()>),
    Mutex(ReentrantMutex<()>),
}

#[derive(Clone)]
pub struct VfsLock {
    inner: Arc<Primitive>,
}

impl VfsLock {
    pub fn new(kind: VfsLockKind) -> Self {
        let primitive = match kind {
            VfsLockKind::ReadWrite => Primitive::ReadWrite(RwLock::new(())),
            VfsLockKind::FastMutex => Primitive::FastMutex(Mutex::new(())),
            VfsLockKind::Mutex => Primitive::Mutex(ReentrantMutex::new(())),
        };
        Self {
            inner: Arc::new(primitive),
        }
    }

    pub fn kind(&self) -> VfsLockKind {
        match *self.inner {
            Primitive::ReadWrite(_) => VfsLockKind::ReadWrite,
            Primitive::FastMutex(_) => VfsLockKind::FastMutex,
            Primitive::Mutex(_) => VfsLockKind::Mutex,
        }
    }

    /// Take another reference to the same primitive.
    pub fn retain(&self) -> Self {
        self.clone()
    }

    /// Drop this reference and return how many remain (a snapshot; other
    /// threads may retain or release concurrently).
    pub fn release(self) -> usize {
        let remaining = Arc::strong_count(&self.inner).saturating_sub(1);
        drop(self);
        remaining
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn ptr_eq(&self, other: &VfsLock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn acquire_read(&self) -> VfsLockGuard<'_> {
        let guard = match &*self.inner {
            Primitive::ReadWrite(lock) => GuardInner::Read(lock.read()),
            Primitive::FastMutex(lock) => GuardInner::Fast(lock.lock()),
            Primitive::Mutex(lock) => GuardInner::Recursive(lock.lock()),
        };
        VfsLockGuard { inner: guard }
    }

    pub fn acquire_write(&self) -> VfsLockGuard<'_> {
        let guard = match &*self.inner {
            Primitive::ReadWrite(lock) => GuardInner::Write(lock.write()),
            Primitive::FastMutex(lock) => GuardInner::Fast(lock.lock()),
            Primitive::Mutex(lock) => GuardInner::Recursive(lock.lock()),
        };
        VfsLockGuard { inner: guard }
    }

    pub fn try_acquire_write(&self) -> Option<VfsLockGuard<'_>> {
        let guard = match &*self.inner {
            Primitive::ReadWrite(lock) => GuardInner::Write(lock.try_write()?),
            Primitive::FastMutex(lock) => GuardInner::Fast(lock.try_lock()?),
            Primitive::Mutex(lock) => GuardInner::Recursive(lock.try_lock()?),
        };
        Some(VfsLockGuard { inner: guard })
    }

    pub fn release_read(&self, guard: VfsLockGuard<'_>) {
        debug_assert!(
            !matches!(guard.inner, GuardInner::Write(_)),
            "release_read called with a write guard"
        );
        drop(guard);
    }

    pub fn release_write(&self, guard: VfsLockGuard<'_>) {
        debug_assert!(
            !matches!(guard.inner, GuardInner::Read(_)),
            "release_write called with a read guard"
        );
        drop(guard);
    }
}

impl fmt::Debug for VfsLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VfsLock")
            .field("kind", &self.kind())
            .field("refs", &self.ref_count())
            .finish()
    }
}

/// Held acquisition of a [`VfsLock`]. Dropping it releases the lock.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct VfsLockGuard<'a> {
    inner: GuardInner<'a>,
}

// Guards are only held for their `Drop`.
#[allow(dead_code)]
enum GuardInner<'a> {
    Read(RwLockReadGuard<'a, ()>),
    Write(RwLockWriteGuard<'a, ()>),
    Fast(MutexGuard<'a, ()>),
    Recursive(ReentrantMutexGuard<'a, ()>),
}

/// How an object obtains its lock at construction time.
#[derive(Clone, Debug, Default)]
pub enum LockPolicy {
    /// Share the owning volume's lock, or run unlocked without a volume.
    #[default]
    Inherit,
    NewReadWrite,
    NewFastMutex,
    NewMutex,
    /// Adopt a caller-supplied lock (consumes the caller's reference).
    Shared(VfsLock),
    /// No lock; the backend synchronizes itself.
    None,
}

impl LockPolicy {
    pub(crate) fn resolve(self, volume_lock: Option<&VfsLock>) -> Option<VfsLock> {
        match self {
            LockPolicy::Inherit => volume_lock.cloned(),
            LockPolicy::NewReadWrite => Some(VfsLock::new(VfsLockKind::ReadWrite)),
            LockPolicy::NewFastMutex => Some(VfsLock::new(VfsLockKind::FastMutex)),
            LockPolicy::NewMutex => Some(VfsLock::new(VfsLockKind::Mutex)),
            LockPolicy::Shared(lock) => Some(lock),
            LockPolicy::None => None,
        }
    }
}

impl From<VfsLockKind> for LockPolicy {
    fn from(kind: VfsLockKind) -> Self {
        match kind {
            VfsLockKind::ReadWrite => LockPolicy::NewReadWrite,
            VfsLockKind::FastMutex => LockPolicy::NewFastMutex,
            VfsLockKind::Mutex => LockPolicy::NewMutex,
        }
    }
}
