use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use vfsobj_core::{
    LockPolicy, TraversalEntry, VFS_OPS_VERSION, VfsDir, VfsDirOps, VfsError, VfsErrorKind,
    VfsFileType, VfsLock, VfsLockKind, VfsObj, VfsObjInfo, VfsObjOps, VfsObjType,
    VfsOpsDescriptor, VfsOpsFeatures, VfsResult, VfsVolume, VfsVolumeOps,
};

static COUNTED_DIR_OPS: VfsOpsDescriptor =
    VfsOpsDescriptor::new("counted-dir", VfsObjType::Directory, VfsOpsFeatures::empty());

static STALE_DIR_OPS: VfsOpsDescriptor = VfsOpsDescriptor {
    version: VFS_OPS_VERSION - 1,
    ..VfsOpsDescriptor::new("stale-dir", VfsObjType::Directory, VfsOpsFeatures::empty())
};

static TRUNCATED_DIR_OPS: VfsOpsDescriptor = VfsOpsDescriptor {
    end_marker: 0,
    ..VfsOpsDescriptor::new("truncated-dir", VfsObjType::Directory, VfsOpsFeatures::empty())
};

static MISLABELED_DIR_OPS: VfsOpsDescriptor =
    VfsOpsDescriptor::new("mislabeled-dir", VfsObjType::File, VfsOpsFeatures::empty());

static COUNTED_VOLUME_OPS: VfsOpsDescriptor =
    VfsOpsDescriptor::new("counted-volume", VfsObjType::Volume, VfsOpsFeatures::empty());

/// A directory with no children that counts its `close` calls.
struct CountedDir {
    descriptor: &'static VfsOpsDescriptor,
    closes: Arc<AtomicUsize>,
}

impl CountedDir {
    fn new(closes: &Arc<AtomicUsize>) -> Self {
        Self {
            descriptor: &COUNTED_DIR_OPS,
            closes: closes.clone(),
        }
    }
}

impl VfsObjOps for CountedDir {
    fn descriptor(&self) -> &'static VfsOpsDescriptor {
        self.descriptor
    }

    fn close(&self) -> VfsResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn query_info(&self) -> VfsResult<VfsObjInfo> {
        Ok(VfsObjInfo::new(VfsFileType::Directory))
    }
}

impl VfsDirOps for CountedDir {
    fn traversal_open(
        &self,
        _volume: Option<&VfsVolume>,
        _name: &str,
    ) -> VfsResult<TraversalEntry> {
        Err(VfsError::new(VfsErrorKind::FileNotFound, "counted.traversal_open"))
    }
}

struct CountedVolume {
    closes: Arc<AtomicUsize>,
}

impl VfsObjOps for CountedVolume {
    fn descriptor(&self) -> &'static VfsOpsDescriptor {
        &COUNTED_VOLUME_OPS
    }

    fn close(&self) -> VfsResult<()> {
        Ok(())
    }

    fn query_info(&self) -> VfsResult<VfsObjInfo> {
        Ok(VfsObjInfo::new(VfsFileType::Directory))
    }
}

impl VfsVolumeOps for CountedVolume {
    fn open_root(&self, volume: &VfsVolume) -> VfsResult<VfsDir> {
        VfsDir::new(CountedDir::new(&self.closes), Some(volume), LockPolicy::Inherit)
    }
}

fn counted_dir() -> (VfsDir, Arc<AtomicUsize>) {
    let closes = Arc::new(AtomicUsize::new(0));
    let dir = VfsDir::new(CountedDir::new(&closes), None, LockPolicy::NewReadWrite).unwrap();
    (dir, closes)
}

#[test]
fn balanced_retain_release_keeps_the_object_open() {
    let (dir, closes) = counted_dir();
    let retained: Vec<_> = (0..5).map(|_| dir.retain()).collect();
    assert_eq!(dir.ref_count(), 6);
    for handle in retained {
        handle.release();
    }
    assert_eq!(dir.ref_count(), 1);
    assert_eq!(closes.load(Ordering::SeqCst), 0);
}

#[test]
fn close_runs_once_on_the_last_release() {
    let (dir, closes) = counted_dir();
    let handles: Vec<_> = (0..4).map(|_| dir.retain()).collect();
    drop(dir);
    let mut remaining = Vec::new();
    for handle in handles {
        assert_eq!(closes.load(Ordering::SeqCst), 0);
        remaining.push(handle.release());
    }
    assert_eq!(remaining, vec![3, 2, 1, 0]);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn racing_releases_close_exactly_once() {
    for _ in 0..64 {
        let (dir, closes) = counted_dir();
        let barrier = Arc::new(Barrier::new(2));
        let threads: Vec<_> = [dir.retain(), dir]
            .into_iter()
            .map(|handle| {
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    handle.release();
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn weak_reference_does_not_outlive_the_object() {
    let (dir, closes) = counted_dir();
    let weak = dir.to_obj().downgrade();
    let upgraded = weak.upgrade().unwrap();
    assert!(upgraded.to_dir().unwrap().same_object(&dir));
    drop(upgraded);
    drop(dir);
    assert!(weak.is_closed());
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(weak.upgrade().unwrap_err().kind(), VfsErrorKind::InvalidHandle);
}

#[tracing_test::traced_test]
#[test]
fn bad_operation_tables_are_rejected() {
    let closes = Arc::new(AtomicUsize::new(0));
    for (descriptor, expected) in [
        (&STALE_DIR_OPS, VfsErrorKind::VersionMismatch),
        (&TRUNCATED_DIR_OPS, VfsErrorKind::VersionMismatch),
        (&MISLABELED_DIR_OPS, VfsErrorKind::InvalidInput),
    ] {
        let ops = CountedDir {
            descriptor,
            closes: closes.clone(),
        };
        let err = VfsDir::new(ops, None, LockPolicy::None).unwrap_err();
        assert_eq!(err.kind(), expected);
    }
    // Rejected instances are dropped without ever becoming objects.
    assert_eq!(closes.load(Ordering::SeqCst), 0);
    assert!(logs_contain("rejecting operations table with unknown version"));
    assert!(logs_contain("declares the wrong object type"));
}

#[test]
fn kind_casts_preserve_identity() {
    let (dir, _closes) = counted_dir();
    let obj = VfsObj::from_dir(&dir);
    assert_eq!(obj.obj_type(), VfsObjType::Directory);
    assert!(obj.to_dir().unwrap().same_object(&dir));
    assert!(obj.to_file().is_none());
    assert!(obj.to_io_stream().is_none());
    assert!(obj.to_symlink().is_none());
    assert!(obj.to_volume().is_none());
    assert!(obj.to_fs_stream().is_none());
    assert_eq!(dir.ref_count(), 2);
    assert!(dir.instance::<CountedDir>().is_some());
}

#[test]
fn objects_inherit_or_replace_the_volume_lock() {
    let closes = Arc::new(AtomicUsize::new(0));
    let volume = VfsVolume::new(
        CountedVolume {
            closes: closes.clone(),
        },
        LockPolicy::NewReadWrite,
    )
    .unwrap();
    let volume_lock = volume.lock().unwrap();

    let root = volume.open_root().unwrap();
    assert!(root.lock().unwrap().ptr_eq(volume_lock));
    assert!(root.volume().unwrap().same_object(&volume));

    let own =
        VfsDir::new(CountedDir::new(&closes), Some(&volume), LockPolicy::NewFastMutex).unwrap();
    assert_eq!(own.lock().unwrap().kind(), VfsLockKind::FastMutex);
    assert!(!own.lock().unwrap().ptr_eq(volume_lock));

    let unlocked = VfsDir::new(CountedDir::new(&closes), Some(&volume), LockPolicy::None).unwrap();
    assert!(unlocked.lock().is_none());

    let shared = VfsLock::new(VfsLockKind::Mutex);
    let adopted = VfsDir::new(
        CountedDir::new(&closes),
        None,
        LockPolicy::Shared(shared.retain()),
    )
    .unwrap();
    assert!(adopted.lock().unwrap().ptr_eq(&shared));
    assert_eq!(shared.ref_count(), 2);

    let orphan = VfsDir::new(CountedDir::new(&closes), None, LockPolicy::Inherit).unwrap();
    assert!(orphan.lock().is_none());

    drop((root, own, unlocked, adopted, orphan));
    assert_eq!(closes.load(Ordering::SeqCst), 5);
    assert_eq!(shared.ref_count(), 1);
}

#[test]
fn objects_keep_their_volume_alive() {
    let closes = Arc::new(AtomicUsize::new(0));
    let volume = VfsVolume::new(CountedVolume { closes }, LockPolicy::NewReadWrite).unwrap();
    let weak_volume = volume.to_obj().downgrade();
    let root = volume.open_root().unwrap();
    drop(volume);
    assert!(!weak_volume.is_closed());
    drop(root);
    assert!(weak_volume.is_closed());
}
