mod config;
mod dir;
mod file;
mod fs;
mod stream;
mod symlink;

pub use config::MemFsConfig;
pub use fs::MemFs;
pub use stream::{new_fs_stream, new_io_stream};

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vfsobj_core::{OpenFlags, VfsErrorKind, VfsFileType, VfsLockKind};

    const RW_CREATE: OpenFlags = OpenFlags::READ
        .union(OpenFlags::WRITE)
        .union(OpenFlags::CREATE);

    fn memfs() -> MemFs {
        MemFs::new(MemFsConfig::default()).unwrap()
    }

    #[test]
    fn objects_share_the_volume_lock() {
        let fs = memfs();
        let volume = fs.volume();
        let root = volume.open_root().unwrap();
        let file = root.open_file("a", RW_CREATE, 0o644).unwrap();
        let lock = volume.lock().unwrap();
        assert_eq!(lock.kind(), VfsLockKind::ReadWrite);
        assert!(root.lock().unwrap().ptr_eq(lock));
        assert!(file.lock().unwrap().ptr_eq(lock));
    }

    #[test]
    fn byte_quota_is_enforced_and_released() {
        let fs = MemFs::new(MemFsConfig {
            max_bytes: Some(8),
            ..MemFsConfig::default()
        })
        .unwrap();
        let root = fs.volume().open_root().unwrap();
        let file = root.open_file("f", RW_CREATE, 0o644).unwrap();
        file.to_io_stream().write_all(b"12345678").unwrap();
        assert_eq!(fs.bytes_used(), 8);
        let err = file.to_io_stream().write(b"9").unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::NoMemory);
        assert_eq!(file.max_size().unwrap(), 8);

        file.set_size(2).unwrap();
        assert_eq!(fs.bytes_used(), 2);
        drop(file);
        root.unlink_entry("f").unwrap();
        assert_eq!(fs.bytes_used(), 0);
    }

    #[test]
    fn out_of_range_sizes_fail_without_touching_the_file() {
        let fs = memfs();
        let root = fs.volume().open_root().unwrap();
        let file = root.open_file("f", RW_CREATE, 0o644).unwrap();
        file.write_at(0, b"abc").unwrap();

        let err = file.write_at(u64::MAX - 1, b"xyz").unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::InvalidInput);
        file.seek(std::io::SeekFrom::Start(u64::MAX)).unwrap();
        let err = file.to_io_stream().write(b"z").unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::InvalidInput);
        let err = file.set_size(u64::MAX).unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::InvalidInput);

        assert_eq!(file.read_at(0, &mut [0u8; 8]).unwrap().bytes, 3);
        assert_eq!(fs.bytes_used(), 3);
    }

    #[test]
    fn oversized_growth_under_a_quota_is_rejected() {
        let fs = MemFs::new(MemFsConfig {
            max_bytes: Some(8),
            ..MemFsConfig::default()
        })
        .unwrap();
        let file = fs.volume().open_file("/f", RW_CREATE, 0o644).unwrap();
        file.write_at(0, b"ab").unwrap();
        assert_eq!(file.set_size(1 << 40).unwrap_err().kind(), VfsErrorKind::NoMemory);
        let err = file.write_at(1 << 40, b"x").unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::NoMemory);
        assert_eq!(file.size().unwrap(), 2);
        assert_eq!(fs.bytes_used(), 2);
    }

    #[test]
    fn inode_quota_is_enforced() {
        let fs = MemFs::new(MemFsConfig {
            max_inodes: Some(2),
            ..MemFsConfig::default()
        })
        .unwrap();
        let root = fs.volume().open_root().unwrap();
        root.create_dir("one", 0o755).unwrap();
        let err = root.create_dir("two", 0o755).unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::NoMemory);
        assert_eq!(fs.node_count(), 2);
    }

    #[test]
    fn read_dir_order_follows_config() {
        for (deterministic, expected) in [(true, ["a", "b", "c"]), (false, ["c", "a", "b"])] {
            let fs = MemFs::new(MemFsConfig {
                deterministic_readdir: deterministic,
                ..MemFsConfig::default()
            })
            .unwrap();
            let root = fs.volume().open_root().unwrap();
            for name in ["c", "a", "b"] {
                root.create_dir(name, 0o755).unwrap();
            }
            let names: Vec<_> = root.entries().unwrap().into_iter().map(|e| e.name).collect();
            assert_eq!(names, expected);
        }
    }

    #[test]
    fn open_file_flag_handling() {
        let fs = memfs();
        let root = fs.volume().open_root().unwrap();
        root.create_dir("d", 0o755).unwrap();
        assert_eq!(
            root.open_file("d", OpenFlags::READ, 0).unwrap_err().kind(),
            VfsErrorKind::IsDir
        );
        assert_eq!(
            root.open_file("missing", OpenFlags::READ, 0).unwrap_err().kind(),
            VfsErrorKind::FileNotFound
        );

        let file = root.open_file("f", RW_CREATE, 0o644).unwrap();
        file.write_at(0, b"data").unwrap();
        let exclusive = RW_CREATE | OpenFlags::EXCLUSIVE;
        assert_eq!(
            root.open_file("f", exclusive, 0o644).unwrap_err().kind(),
            VfsErrorKind::AlreadyExists
        );

        let read_only = root.open_file("f", OpenFlags::READ, 0).unwrap();
        assert_eq!(
            read_only.write_at(0, b"x").unwrap_err().kind(),
            VfsErrorKind::PermissionDenied
        );

        let truncated = root
            .open_file("f", OpenFlags::WRITE | OpenFlags::TRUNCATE, 0)
            .unwrap();
        assert_eq!(truncated.size().unwrap(), 0);
        assert_eq!(fs.bytes_used(), 0);
    }

    #[test]
    fn append_writes_land_at_the_end() {
        let fs = memfs();
        let root = fs.volume().open_root().unwrap();
        root.open_file("log", RW_CREATE, 0o644)
            .unwrap()
            .write_at(0, b"one ")
            .unwrap();
        let log = root
            .open_file("log", OpenFlags::READ | OpenFlags::WRITE | OpenFlags::APPEND, 0)
            .unwrap();
        log.to_io_stream().write_all(b"two").unwrap();
        assert_eq!(log.read_all().unwrap(), b"one two");
    }

    #[test]
    fn unlinked_file_handles_go_stale() {
        let fs = memfs();
        let root = fs.volume().open_root().unwrap();
        let file = root.open_file("f", RW_CREATE, 0o644).unwrap();
        root.unlink_entry("f").unwrap();
        assert_eq!(file.size().unwrap_err().kind(), VfsErrorKind::FileNotFound);
        let again = root.open_file("f", RW_CREATE, 0o644).unwrap();
        assert_eq!(again.size().unwrap(), 0);
        assert_eq!(file.size().unwrap_err().kind(), VfsErrorKind::FileNotFound);
    }

    #[test]
    fn non_empty_dirs_are_not_unlinked() {
        let fs = memfs();
        let root = fs.volume().open_root().unwrap();
        let dir = root.create_dir("d", 0o755).unwrap();
        dir.create_dir("inner", 0o755).unwrap();
        assert_eq!(
            root.unlink_entry("d").unwrap_err().kind(),
            VfsErrorKind::DirNotEmpty
        );
        dir.unlink_entry("inner").unwrap();
        root.unlink_entry("d").unwrap();
    }

    #[test]
    fn mount_replaces_an_empty_dir_only() {
        let outer = memfs();
        let inner = memfs();
        let root = outer.volume().open_root().unwrap();
        let busy = root.create_dir("busy", 0o755).unwrap();
        busy.create_dir("x", 0o755).unwrap();
        root.create_dir("empty", 0o755).unwrap();

        let err = outer.mount("/busy", inner.volume()).unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::AlreadyExists);
        outer.mount("/empty", inner.volume()).unwrap();
        outer.mount("/fresh", inner.volume()).unwrap();
        assert_eq!(
            outer.mount("/", inner.volume()).unwrap_err().kind(),
            VfsErrorKind::InvalidInput
        );

        let info = root.query_entry_info("empty").unwrap();
        assert_eq!(info.file_type, VfsFileType::Directory);
        let mounted = root.open_dir("fresh").unwrap();
        assert!(mounted.volume().unwrap().same_object(&inner.volume()));
    }

    #[test]
    fn open_objects_are_counted_until_dropped() {
        let fs = memfs();
        let root = fs.volume().open_root().unwrap();
        let file = root.open_file("f", RW_CREATE, 0o644).unwrap();
        let link = root.create_symlink("l", "f").unwrap();
        assert_eq!(fs.open_objects(), 3);
        let other = file.retain();
        drop(file);
        assert_eq!(fs.open_objects(), 3);
        drop(other);
        drop(link);
        assert_eq!(fs.open_objects(), 1);
        drop(root);
        assert_eq!(fs.open_objects(), 0);
    }

    #[test]
    fn set_mode_masks_permission_bits() {
        let fs = memfs();
        let root = fs.volume().open_root().unwrap();
        let file = root.open_file("f", RW_CREATE, 0o644).unwrap();
        let obj = file.to_obj();
        obj.set_mode(0o600, 0o777).unwrap();
        assert_eq!(obj.query_info().unwrap().mode.permissions(), 0o600);
        let link = root.create_symlink("l", "f").unwrap().to_obj();
        link.set_owner(Some(7), None).unwrap();
        assert_eq!(link.query_info().unwrap().uid, 7);
    }
}
