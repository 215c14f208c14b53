use pretty_assertions::assert_eq;
use std::sync::Arc;
use vfsobj_core::{
    OpenFlags, ParsedPath, PathWalker, VfsConfig, VfsErrorKind, VfsFileType, VfsObj, VfsVolume,
    traverse_to_parent,
};
use vfsobj_mem::{MemFs, MemFsConfig};

/// `/dir1/dir2/file.txt` plus `/link -> /dir1`.
fn sample_tree() -> (MemFs, VfsVolume) {
    let fs = MemFs::new(MemFsConfig::default()).unwrap();
    let volume = fs.volume();
    volume.create_dir("/dir1", 0o755).unwrap();
    volume.create_dir("/dir1/dir2", 0o755).unwrap();
    volume
        .open_file(
            "/dir1/dir2/file.txt",
            OpenFlags::WRITE | OpenFlags::CREATE,
            0o644,
        )
        .unwrap()
        .write_at(0, b"payload")
        .unwrap();
    volume.create_symlink("/link", "/dir1").unwrap();
    (fs, volume)
}

fn inode_of(volume: &VfsVolume, path: &str) -> u64 {
    volume.query_path_info(path, true).unwrap().inode
}

#[test]
fn parent_of_a_nested_file_is_its_directory() {
    let (_fs, volume) = sample_tree();
    let mut path = ParsedPath::parse("/dir1/dir2/file.txt", None).unwrap();
    let parent = traverse_to_parent(&volume, &mut path, false).unwrap();
    assert_eq!(parent.query_info().unwrap().inode, inode_of(&volume, "/dir1/dir2"));
    assert_eq!(path.last(), Some("file.txt"));
}

#[test]
fn parent_of_a_single_component_is_the_root() {
    let (_fs, volume) = sample_tree();
    let mut path = ParsedPath::parse("/whatever", None).unwrap();
    let parent = traverse_to_parent(&volume, &mut path, false).unwrap();
    assert_eq!(parent.query_info().unwrap().inode, inode_of(&volume, "/"));
}

#[tracing_test::traced_test]
#[test]
fn symlink_in_the_middle_is_followed_once() {
    let (_fs, volume) = sample_tree();
    let walker = PathWalker::default();
    let mut path = walker.parse("/link/dir2/x").unwrap();
    let resolved = walker.traverse_to_parent(&volume, &mut path, false).unwrap();
    assert_eq!(resolved.traversal.symlinks_followed, 1);
    assert_eq!(resolved.traversal.components_walked, 2);
    assert_eq!(path.as_str(), "/dir1/dir2/x");
    assert_eq!(
        resolved.dir.query_info().unwrap().inode,
        inode_of(&volume, "/dir1/dir2")
    );
    assert!(logs_contain("followed symlink"));
}

#[test]
fn relative_symlink_resolves_against_its_directory() {
    let (_fs, volume) = sample_tree();
    volume.create_symlink("/dir1/up", "../dir1/dir2").unwrap();
    let file = volume
        .open_file("/dir1/up/file.txt", OpenFlags::READ, 0)
        .unwrap();
    assert_eq!(file.read_all().unwrap(), b"payload");
}

#[test]
fn final_symlink_is_followed_only_when_asked() {
    let (_fs, volume) = sample_tree();
    let lstat = volume.query_path_info("/link", false).unwrap();
    assert_eq!(lstat.file_type, VfsFileType::Symlink);
    let stat = volume.query_path_info("/link", true).unwrap();
    assert_eq!(stat.file_type, VfsFileType::Directory);

    let obj = volume.open_obj("/link", OpenFlags::READ, false).unwrap();
    assert_eq!(obj.to_symlink().unwrap().read().unwrap(), "/dir1");
    let obj = volume.open_obj("/link", OpenFlags::READ, true).unwrap();
    assert!(matches!(obj, VfsObj::Dir(_)));
}

#[test]
fn symlink_cycle_fails_after_the_hop_bound() {
    let fs = MemFs::new(MemFsConfig::default()).unwrap();
    let volume = fs.volume();
    volume.create_symlink("/a", "/b").unwrap();
    volume.create_symlink("/b", "/a").unwrap();

    let walker = PathWalker::new(Arc::new(VfsConfig {
        max_symlinks: 5,
        ..VfsConfig::default()
    }));
    let mut path = walker.parse("/a/x").unwrap();
    let err = walker.traverse_to_parent(&volume, &mut path, false).unwrap_err();
    assert_eq!(err.kind(), VfsErrorKind::TooManySymlinks);

    let err = volume.open_dir("/a").unwrap_err();
    assert_eq!(err.kind(), VfsErrorKind::TooManySymlinks);
}

#[test]
fn chain_of_exactly_the_bound_resolves() {
    let fs = MemFs::new(MemFsConfig::default()).unwrap();
    let volume = fs.volume();
    volume.create_dir("/target", 0o755).unwrap();
    let max = 4;
    // l0 -> l1 -> ... -> l{max-1} -> /target is `max` hops.
    for hop in 0..max {
        let target = if hop + 1 == max {
            "/target".to_owned()
        } else {
            format!("/l{}", hop + 1)
        };
        volume.create_symlink(&format!("/l{hop}"), &target).unwrap();
    }
    let walker = PathWalker::new(Arc::new(VfsConfig {
        max_symlinks: max as u16,
        ..VfsConfig::default()
    }));

    let mut path = walker.parse("/l0/x").unwrap();
    let resolved = walker.traverse_to_parent(&volume, &mut path, false).unwrap();
    assert_eq!(resolved.traversal.symlinks_followed, max as u16);
    assert_eq!(path.as_str(), "/target/x");

    volume.create_symlink("/extra", "/l0").unwrap();
    let mut path = walker.parse("/extra/x").unwrap();
    let err = walker.traverse_to_parent(&volume, &mut path, false).unwrap_err();
    assert_eq!(err.kind(), VfsErrorKind::TooManySymlinks);
}

#[test]
fn intermediate_failures_map_to_path_errors() {
    let (_fs, volume) = sample_tree();
    let err = volume.open_dir("/missing/deeper").unwrap_err();
    assert_eq!(err.kind(), VfsErrorKind::PathNotFound);
    let err = volume.open_dir("/dir1/dir2/file.txt/deeper").unwrap_err();
    assert_eq!(err.kind(), VfsErrorKind::NotDir);
    let err = volume.open_dir("/dir1/missing").unwrap_err();
    assert_eq!(err.kind(), VfsErrorKind::FileNotFound);
}

#[test]
fn trailing_slash_on_a_file_is_not_dir() {
    let (_fs, volume) = sample_tree();
    let err = volume
        .open_file("/dir1/dir2/file.txt/", OpenFlags::READ, 0)
        .unwrap_err();
    assert_eq!(err.kind(), VfsErrorKind::NotDir);
    let err = volume.query_path_info("/dir1/dir2/file.txt/", true).unwrap_err();
    assert_eq!(err.kind(), VfsErrorKind::NotDir);
    let err = volume.open_file("/dir1/", OpenFlags::READ, 0).unwrap_err();
    assert_eq!(err.kind(), VfsErrorKind::IsDir);
}

#[test]
fn mounted_volume_is_crossed() {
    let (outer, volume) = sample_tree();
    let inner = MemFs::new(MemFsConfig::default()).unwrap();
    inner.volume().create_dir("/nested", 0o755).unwrap();
    outer.mount("/dir1/mnt", inner.volume()).unwrap();

    let dir = volume.open_dir("/dir1/mnt/nested").unwrap();
    assert!(dir.volume().unwrap().same_object(&inner.volume()));
    let file = volume
        .open_file(
            "/dir1/mnt/nested/in.txt",
            OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE,
            0o644,
        )
        .unwrap();
    file.write_at(0, b"inner").unwrap();
    assert_eq!(
        inner.volume().query_path_info("/nested/in.txt", true).unwrap().size,
        5
    );
    assert!(outer.volume().query_path_info("/nested", true).is_err());

    let mount_root = volume.open_dir("/dir1/mnt").unwrap();
    assert!(mount_root.volume().unwrap().same_object(&inner.volume()));
}

#[test]
fn create_and_unlink_through_paths() {
    let (_fs, volume) = sample_tree();
    volume.create_dir("/link/made", 0o700).unwrap();
    let info = volume.query_path_info("/dir1/made", true).unwrap();
    assert_eq!(info.mode.permissions(), 0o700);

    assert_eq!(
        volume.create_dir("/dir1/made", 0o700).unwrap_err().kind(),
        VfsErrorKind::AlreadyExists
    );
    volume.unlink("/dir1/made/").unwrap();
    assert!(volume.query_path_info("/dir1/made", true).is_err());

    volume.unlink("/link").unwrap();
    assert!(volume.query_path_info("/dir1", true).unwrap().is_dir());
    assert_eq!(
        volume.unlink("/").unwrap_err().kind(),
        VfsErrorKind::InvalidInput
    );
}

#[test]
fn dot_dot_cannot_escape_the_root() {
    let (_fs, volume) = sample_tree();
    let dir = volume.open_dir("/../../dir1/./dir2/..").unwrap();
    assert_eq!(dir.query_info().unwrap().inode, inode_of(&volume, "/dir1"));
}
