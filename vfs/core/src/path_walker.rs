//! Symlink- and mount-aware path traversal.
//!
//! Locks are taken per directory lookup only, so a traversal is not atomic
//! with respect to concurrent changes of the tree.

use crate::config::VfsConfig;
use crate::dir::{TraversalEntry, VfsDir};
use crate::file::VfsFile;
use crate::flags::OpenFlags;
use crate::info::VfsObjInfo;
use crate::obj::VfsObj;
use crate::path::ParsedPath;
use crate::symlink::VfsSymlink;
use crate::volume::VfsVolume;
use crate::{VfsError, VfsErrorKind, VfsResult};
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TraversalInfo {
    pub components_walked: usize,
    /// Each followed symlink sends resolution back to the volume root.
    pub symlinks_followed: u16,
}

#[derive(Debug)]
pub struct ResolvedParent {
    pub dir: VfsDir,
    pub traversal: TraversalInfo,
}

pub struct PathWalker {
    config: Arc<VfsConfig>,
}

impl Default for PathWalker {
    fn default() -> Self {
        Self::new(Arc::new(VfsConfig::default()))
    }
}

impl PathWalker {
    pub fn new(config: Arc<VfsConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    /// Parse with this walker's limits; relative paths start at the root.
    pub fn parse(&self, path: &str) -> VfsResult<ParsedPath> {
        ParsedPath::parse_with_config(path, None, &self.config)
    }

    /// Walk `path` from the volume root and return the directory holding
    /// its final component.
    ///
    /// With `follow_final_symlink` set, a symlink in the final position is
    /// resolved too and `path` is rewritten to name its target. Every
    /// symlink rewrites `path` and restarts resolution at the root.
    pub fn traverse_to_parent(
        &self,
        volume: &VfsVolume,
        path: &mut ParsedPath,
        follow_final_symlink: bool,
    ) -> VfsResult<ResolvedParent> {
        let mut traversal = TraversalInfo::default();
        let mut current = volume.open_root()?;
        let mut index = 0;

        while let Some(name) = path.component(index) {
            let is_final = index + 1 == path.len();
            if is_final && !follow_final_symlink {
                break;
            }
            trace!(component = name, index, is_final, "traversal step");

            let entry = match current.traversal_open(name) {
                Ok(entry) => entry,
                Err(err) if is_final && err.kind().is_not_found() => break,
                Err(err) => return Err(Self::map_intermediate(err)),
            };

            match entry {
                TraversalEntry::Symlink(link) => {
                    if traversal.symlinks_followed >= self.config.max_symlinks {
                        debug!(
                            path = path.as_str(),
                            hops = traversal.symlinks_followed,
                            "symlink hop limit reached"
                        );
                        return Err(VfsError::new(
                            VfsErrorKind::TooManySymlinks,
                            "path.traverse.symlink_loop",
                        ));
                    }
                    let target = link.read()?;
                    drop(link);
                    traversal.symlinks_followed += 1;
                    let resume_at = self.splice(path, index, &target)?;
                    debug!(
                        component = index,
                        target = target.as_str(),
                        rewritten = path.as_str(),
                        resume_at,
                        "followed symlink, restarting at root"
                    );
                    current = volume.open_root()?;
                    index = 0;
                    traversal.components_walked = 0;
                }
                _ if is_final => break,
                TraversalEntry::Dir(child) => {
                    current = child;
                    index += 1;
                    traversal.components_walked += 1;
                }
                TraversalEntry::Mount(mounted) => {
                    debug!(component = name, "crossing into mounted volume");
                    current = mounted.open_root()?;
                    index += 1;
                    traversal.components_walked += 1;
                }
            }
        }

        Ok(ResolvedParent {
            dir: current,
            traversal,
        })
    }

    fn map_intermediate(err: VfsError) -> VfsError {
        match err.kind() {
            VfsErrorKind::FileNotFound | VfsErrorKind::PathNotFound => {
                VfsError::new(VfsErrorKind::PathNotFound, "path.traverse.not_found")
            }
            VfsErrorKind::NotDir => VfsError::new(VfsErrorKind::NotDir, "path.traverse.not_dir"),
            _ => err,
        }
    }

    /// Replace component `index` (a symlink) with `target` and keep whatever
    /// followed it. Returns the earliest component the splice touched.
    fn splice(&self, path: &mut ParsedPath, index: usize, target: &str) -> VfsResult<usize> {
        if target.len() > path.limit() {
            return Err(VfsError::new(
                VfsErrorKind::NameTooLong,
                "path.traverse.symlink_target",
            ));
        }
        let rest = path.components_from(index + 1).to_owned();
        let must_be_dir = path.must_be_dir();

        let mut resume_at = if target.starts_with('/') { 0 } else { index };
        path.truncate(resume_at);
        path.append_tracked(target, &mut resume_at)?;
        let target_is_dir = path.must_be_dir();
        if !rest.is_empty() {
            path.append(&rest)?;
        }
        path.set_must_be_dir(must_be_dir || (rest.is_empty() && target_is_dir));
        Ok(resume_at)
    }

    fn resolve(
        &self,
        volume: &VfsVolume,
        path: &str,
        follow_final_symlink: bool,
    ) -> VfsResult<(VfsDir, ParsedPath)> {
        let mut parsed = self.parse(path)?;
        let parent = self.traverse_to_parent(volume, &mut parsed, follow_final_symlink)?;
        Ok((parent.dir, parsed))
    }

    pub fn open_dir(&self, volume: &VfsVolume, path: &str) -> VfsResult<VfsDir> {
        let (parent, parsed) = self.resolve(volume, path, true)?;
        match parsed.last() {
            None => Ok(parent),
            Some(name) => parent.open_dir(name),
        }
    }

    pub fn open_file(
        &self,
        volume: &VfsVolume,
        path: &str,
        flags: OpenFlags,
        mode: u32,
    ) -> VfsResult<VfsFile> {
        let (parent, parsed) = self.resolve(volume, path, true)?;
        let Some(name) = parsed.last() else {
            return Err(VfsError::new(VfsErrorKind::IsDir, "path.open_file.root"));
        };
        if parsed.must_be_dir() {
            return Err(match parent.query_entry_info(name) {
                Ok(info) if info.is_dir() => {
                    VfsError::new(VfsErrorKind::IsDir, "path.open_file.dir")
                }
                _ => VfsError::new(VfsErrorKind::NotDir, "path.open_file.trailing_slash"),
            });
        }
        parent.open_file(name, flags, mode)
    }

    pub fn create_dir(&self, volume: &VfsVolume, path: &str, mode: u32) -> VfsResult<VfsDir> {
        let (parent, parsed) = self.resolve(volume, path, false)?;
        let Some(name) = parsed.last() else {
            return Err(VfsError::new(VfsErrorKind::AlreadyExists, "path.create_dir.root"));
        };
        parent.create_dir(name, mode)
    }

    pub fn open_symlink(&self, volume: &VfsVolume, path: &str) -> VfsResult<VfsSymlink> {
        let (parent, parsed) = self.resolve(volume, path, false)?;
        let Some(name) = parsed.last() else {
            return Err(VfsError::new(VfsErrorKind::NotSymlink, "path.open_symlink.root"));
        };
        if parsed.must_be_dir() {
            return Err(VfsError::new(VfsErrorKind::NotDir, "path.open_symlink.trailing_slash"));
        }
        parent.open_symlink(name)
    }

    pub fn create_symlink(
        &self,
        volume: &VfsVolume,
        path: &str,
        target: &str,
    ) -> VfsResult<VfsSymlink> {
        let (parent, parsed) = self.resolve(volume, path, false)?;
        let Some(name) = parsed.last() else {
            return Err(VfsError::new(VfsErrorKind::AlreadyExists, "path.create_symlink.root"));
        };
        if parsed.must_be_dir() {
            return Err(VfsError::new(VfsErrorKind::NotDir, "path.create_symlink.trailing_slash"));
        }
        parent.create_symlink(name, target)
    }

    pub fn query_path_info(
        &self,
        volume: &VfsVolume,
        path: &str,
        follow_final_symlink: bool,
    ) -> VfsResult<VfsObjInfo> {
        let (parent, parsed) = self.resolve(volume, path, follow_final_symlink)?;
        let info = match parsed.last() {
            None => parent.query_info()?,
            Some(name) => parent.query_entry_info(name)?,
        };
        if parsed.must_be_dir() && !info.is_dir() {
            return Err(VfsError::new(VfsErrorKind::NotDir, "path.query_info.trailing_slash"));
        }
        Ok(info)
    }

    pub fn unlink(&self, volume: &VfsVolume, path: &str) -> VfsResult<()> {
        let (parent, parsed) = self.resolve(volume, path, false)?;
        let Some(name) = parsed.last() else {
            return Err(VfsError::new(VfsErrorKind::InvalidInput, "path.unlink.root"));
        };
        if parsed.must_be_dir() && !parent.query_entry_info(name)?.is_dir() {
            return Err(VfsError::new(VfsErrorKind::NotDir, "path.unlink.trailing_slash"));
        }
        parent.unlink_entry(name)
    }

    /// Open whatever `path` names. Anything that is not a directory or a
    /// symlink is opened as a file with `flags`, which also allows creating
    /// a missing final component.
    pub fn open_obj(
        &self,
        volume: &VfsVolume,
        path: &str,
        flags: OpenFlags,
        follow_final_symlink: bool,
    ) -> VfsResult<VfsObj> {
        let (parent, parsed) = self.resolve(volume, path, follow_final_symlink)?;
        let Some(name) = parsed.last() else {
            return Ok(VfsObj::Dir(parent));
        };
        match parent.traversal_open(name) {
            Ok(TraversalEntry::Dir(dir)) => Ok(VfsObj::Dir(dir)),
            Ok(TraversalEntry::Mount(mounted)) => Ok(VfsObj::Dir(mounted.open_root()?)),
            Ok(TraversalEntry::Symlink(_)) if parsed.must_be_dir() => {
                Err(VfsError::new(VfsErrorKind::NotDir, "path.open_obj.trailing_slash"))
            }
            Ok(TraversalEntry::Symlink(link)) => Ok(VfsObj::Symlink(link)),
            Err(err) if err.kind().is_not_found() => {
                if parsed.must_be_dir() {
                    return Err(VfsError::new(
                        if err.kind() == VfsErrorKind::NotDir {
                            VfsErrorKind::NotDir
                        } else {
                            VfsErrorKind::PathNotFound
                        },
                        "path.open_obj.trailing_slash",
                    ));
                }
                Ok(VfsObj::File(parent.open_file(name, flags, 0o644)?))
            }
            Err(err) => Err(err),
        }
    }
}

/// [`PathWalker::traverse_to_parent`] with the default configuration.
pub fn traverse_to_parent(
    volume: &VfsVolume,
    path: &mut ParsedPath,
    follow_final_symlink: bool,
) -> VfsResult<VfsDir> {
    PathWalker::default()
        .traverse_to_parent(volume, path, follow_final_symlink)
        .map(|parent| parent.dir)
}

/// Path-based conveniences using the default configuration.
impl VfsVolume {
    pub fn open_dir(&self, path: &str) -> VfsResult<VfsDir> {
        PathWalker::default().open_dir(self, path)
    }

    pub fn open_file(&self, path: &str, flags: OpenFlags, mode: u32) -> VfsResult<VfsFile> {
        PathWalker::default().open_file(self, path, flags, mode)
    }

    pub fn create_dir(&self, path: &str, mode: u32) -> VfsResult<VfsDir> {
        PathWalker::default().create_dir(self, path, mode)
    }

    pub fn open_symlink(&self, path: &str) -> VfsResult<VfsSymlink> {
        PathWalker::default().open_symlink(self, path)
    }

    pub fn create_symlink(&self, path: &str, target: &str) -> VfsResult<VfsSymlink> {
        PathWalker::default().create_symlink(self, path, target)
    }

    pub fn query_path_info(&self, path: &str, follow_final_symlink: bool) -> VfsResult<VfsObjInfo> {
        PathWalker::default().query_path_info(self, path, follow_final_symlink)
    }

    pub fn unlink(&self, path: &str) -> VfsResult<()> {
        PathWalker::default().unlink(self, path)
    }

    pub fn open_obj(
        &self,
        path: &str,
        flags: OpenFlags,
        follow_final_symlink: bool,
    ) -> VfsResult<VfsObj> {
        PathWalker::default().open_obj(self, path, flags, follow_final_symlink)
    }
}
