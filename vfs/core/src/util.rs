//! Helpers for backends and consumers: stream pumping, a trivial poll and
//! filesystem-stream extraction.

use crate::config::DEFAULT_IO_CHUNK_SIZE;
use crate::dir::VfsDir;
use crate::flags::{OpenFlags, PollEvents};
use crate::fs_stream::VfsFsStream;
use crate::io::VfsIoStream;
use crate::obj::VfsObj;
use crate::path::ParsedPath;
use crate::{VfsConfig, VfsError, VfsErrorKind, VfsResult};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

/// Copy `src` into `dst` until `src` ends; returns the bytes copied.
pub fn pump_streams(src: &VfsIoStream, dst: &VfsIoStream) -> VfsResult<u64> {
    pump_streams_with(src, dst, DEFAULT_IO_CHUNK_SIZE)
}

pub fn pump_streams_with(
    src: &VfsIoStream,
    dst: &VfsIoStream,
    chunk_size: usize,
) -> VfsResult<u64> {
    let mut chunk = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    loop {
        let step = src.read(&mut chunk)?;
        dst.write_all(&chunk[..step.bytes])?;
        total += step.bytes as u64;
        if step.eof || step.bytes == 0 {
            trace!(bytes = total, "stream pumped");
            return Ok(total);
        }
    }
}

/// `poll_one` for objects whose readiness never changes: `ready` events
/// are reported at once, anything else waits out the timeout.
pub fn dummy_poll_one(
    ready: PollEvents,
    events: PollEvents,
    timeout: Option<Duration>,
    interruptible: bool,
) -> VfsResult<PollEvents> {
    let hit = ready & events;
    if !hit.is_empty() {
        return Ok(hit);
    }
    match timeout {
        Some(timeout) => {
            if !timeout.is_zero() {
                thread::sleep(timeout);
            }
            Err(VfsError::new(VfsErrorKind::TimedOut, "util.dummy_poll_one"))
        }
        None if interruptible => {
            Err(VfsError::new(VfsErrorKind::Interrupted, "util.dummy_poll_one"))
        }
        None => loop {
            thread::park();
        },
    }
}

/// Recreate every member of `stream` below `dir`. Member names are
/// normalized first, so `..` cannot climb above `dir`. Returns the number
/// of members written.
pub fn extract_fs_stream(stream: &VfsFsStream, dir: &VfsDir) -> VfsResult<usize> {
    extract_fs_stream_with(stream, dir, &VfsConfig::default())
}

pub fn extract_fs_stream_with(
    stream: &VfsFsStream,
    dir: &VfsDir,
    config: &VfsConfig,
) -> VfsResult<usize> {
    let mut count = 0;
    while let Some(entry) = stream.next()? {
        let name = ParsedPath::parse_with_config(&entry.name, None, config)?;
        let Some(leaf) = name.last() else {
            return Err(VfsError::new(VfsErrorKind::InvalidInput, "util.extract.name"));
        };
        let mut parent = dir.clone();
        for index in 0..name.len() - 1 {
            let component = name.component(index).unwrap_or_default();
            parent = open_or_create_dir(&parent, component)?;
        }
        debug!(member = name.as_str(), kind = entry.obj.obj_type().as_str(), "extracting");
        extract_member(&parent, leaf, &entry.obj, config)?;
        count += 1;
    }
    Ok(count)
}

fn open_or_create_dir(parent: &VfsDir, name: &str) -> VfsResult<VfsDir> {
    match parent.open_dir(name) {
        Ok(dir) => Ok(dir),
        Err(err) if err.kind() == VfsErrorKind::FileNotFound => parent.create_dir(name, 0o755),
        Err(err) => Err(err),
    }
}

fn extract_member(parent: &VfsDir, name: &str, obj: &VfsObj, config: &VfsConfig) -> VfsResult<()> {
    let mode = obj
        .query_info()
        .map(|info| info.mode.permissions())
        .unwrap_or(0o644);
    match obj {
        VfsObj::Dir(_) => match parent.create_dir(name, mode) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == VfsErrorKind::AlreadyExists => Ok(()),
            Err(err) => Err(err),
        },
        VfsObj::Symlink(link) => {
            let target = link.read()?;
            parent.create_symlink(name, &target).map(|_| ())
        }
        VfsObj::File(_) | VfsObj::IoStream(_) => {
            let Some(src) = obj.to_io_stream() else {
                return Err(VfsError::new(VfsErrorKind::Internal, "util.extract.stream"));
            };
            let flags = OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE;
            let dst = parent.open_file(name, flags, mode)?;
            pump_streams_with(&src, &dst.to_io_stream(), config.io_chunk_size).map(|_| ())
        }
        VfsObj::Volume(_) | VfsObj::FsStream(_) => {
            Err(VfsError::new(VfsErrorKind::NotSupported, "util.extract.kind"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn dummy_poll_reports_ready_events() {
        let ready = PollEvents::READ | PollEvents::WRITE;
        let hit =
            dummy_poll_one(ready, PollEvents::WRITE | PollEvents::ERROR, None, false).unwrap();
        assert_eq!(hit, PollEvents::WRITE);
    }

    #[test]
    fn dummy_poll_waits_out_the_timeout() {
        let start = Instant::now();
        let err = dummy_poll_one(
            PollEvents::READ,
            PollEvents::ERROR,
            Some(Duration::from_millis(10)),
            false,
        )
        .unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(10));

        let err = dummy_poll_one(PollEvents::empty(), PollEvents::READ, None, true).unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::Interrupted);
    }
}
