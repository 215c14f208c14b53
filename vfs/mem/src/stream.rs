//! Standalone in-memory stream objects not backed by a filesystem node.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use vfsobj_core::util::dummy_poll_one;
use vfsobj_core::{
    FsStreamEntry, LockPolicy, PollEvents, Transfer, VfsError, VfsErrorKind, VfsFileType,
    VfsFsStream, VfsFsStreamOps, VfsIoStream, VfsIoStreamOps, VfsObj, VfsObjInfo, VfsObjOps,
    VfsObjType, VfsOpsDescriptor, VfsOpsFeatures, VfsResult, VfsVolume,
};

static MEM_STREAM_OPS: VfsOpsDescriptor =
    VfsOpsDescriptor::new("memfs-stream", VfsObjType::IoStream, VfsOpsFeatures::empty());

#[derive(Default)]
struct Fifo {
    data: VecDeque<u8>,
    consumed: u64,
}

/// A loopback byte queue: writes append, reads consume from the front.
struct MemIoStream {
    fifo: Mutex<Fifo>,
}

impl VfsObjOps for MemIoStream {
    fn descriptor(&self) -> &'static VfsOpsDescriptor {
        &MEM_STREAM_OPS
    }

    fn close(&self) -> VfsResult<()> {
        Ok(())
    }

    fn query_info(&self) -> VfsResult<VfsObjInfo> {
        let size = self.fifo.lock().data.len() as u64;
        Ok(VfsObjInfo {
            size,
            ..VfsObjInfo::new(VfsFileType::Fifo)
        })
    }
}

impl VfsIoStreamOps for MemIoStream {
    fn read(&self, offset: Option<u64>, buf: &mut [u8], _blocking: bool) -> VfsResult<Transfer> {
        if offset.is_some() {
            return Err(VfsError::new(VfsErrorKind::NotSupported, "mem.stream.read_at"));
        }
        let mut fifo = self.fifo.lock();
        let n = buf.len().min(fifo.data.len());
        for (slot, byte) in buf.iter_mut().zip(fifo.data.drain(..n)) {
            *slot = byte;
        }
        fifo.consumed += n as u64;
        Ok(Transfer::new(n, fifo.data.is_empty()))
    }

    fn write(&self, offset: Option<u64>, buf: &[u8], _blocking: bool) -> VfsResult<usize> {
        if offset.is_some() {
            return Err(VfsError::new(VfsErrorKind::NotSupported, "mem.stream.write_at"));
        }
        self.fifo.lock().data.extend(buf);
        Ok(buf.len())
    }

    fn flush(&self) -> VfsResult<()> {
        Ok(())
    }

    fn poll_one(
        &self,
        events: PollEvents,
        timeout: Option<Duration>,
        interruptible: bool,
    ) -> VfsResult<PollEvents> {
        let mut ready = PollEvents::WRITE;
        if !self.fifo.lock().data.is_empty() {
            ready |= PollEvents::READ;
        }
        dummy_poll_one(ready, events, timeout, interruptible)
    }

    fn tell(&self) -> VfsResult<u64> {
        Ok(self.fifo.lock().consumed)
    }
}

/// A stream preloaded with `data`. Reads drain it; writes append to it.
/// Positional I/O is rejected.
pub fn new_io_stream(data: &[u8]) -> VfsResult<VfsIoStream> {
    let fifo = Fifo {
        data: data.iter().copied().collect(),
        consumed: 0,
    };
    VfsIoStream::new(
        MemIoStream {
            fifo: Mutex::new(fifo),
        },
        None,
        LockPolicy::NewFastMutex,
    )
}

static MEM_FS_STREAM_OPS: VfsOpsDescriptor =
    VfsOpsDescriptor::new("memfs-fs-stream", VfsObjType::FsStream, VfsOpsFeatures::empty());

struct Members {
    queue: VecDeque<FsStreamEntry>,
    ended: bool,
}

/// An ordered queue of named objects, read back in the order added.
struct MemFsStream {
    members: Mutex<Members>,
}

impl VfsObjOps for MemFsStream {
    fn descriptor(&self) -> &'static VfsOpsDescriptor {
        &MEM_FS_STREAM_OPS
    }

    fn close(&self) -> VfsResult<()> {
        Ok(())
    }

    fn query_info(&self) -> VfsResult<VfsObjInfo> {
        let members = self.members.lock();
        Ok(VfsObjInfo {
            size: members.queue.len() as u64,
            ..VfsObjInfo::new(VfsFileType::Unknown)
        })
    }
}

impl VfsFsStreamOps for MemFsStream {
    fn next(&self, _volume: Option<&VfsVolume>) -> VfsResult<Option<FsStreamEntry>> {
        Ok(self.members.lock().queue.pop_front())
    }

    fn add(&self, name: &str, obj: &VfsObj) -> VfsResult<()> {
        let mut members = self.members.lock();
        if members.ended {
            return Err(VfsError::new(VfsErrorKind::InvalidInput, "mem.fs_stream.ended"));
        }
        members.queue.push_back(FsStreamEntry {
            name: name.to_owned(),
            obj: obj.clone(),
        });
        Ok(())
    }

    fn end(&self) -> VfsResult<()> {
        self.members.lock().ended = true;
        Ok(())
    }
}

/// An empty filesystem stream; fill it with `add`, seal it with `end`.
pub fn new_fs_stream() -> VfsResult<VfsFsStream> {
    VfsFsStream::new(
        MemFsStream {
            members: Mutex::new(Members {
                queue: VecDeque::new(),
                ended: false,
            }),
        },
        None,
        LockPolicy::NewFastMutex,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_drains_in_order_and_reports_eof() {
        let stream = new_io_stream(b"hello").unwrap();
        let mut buf = [0u8; 3];
        let step = stream.read(&mut buf).unwrap();
        assert_eq!((step.bytes, step.eof), (3, false));
        assert_eq!(&buf, b"hel");
        stream.write_all(b"!").unwrap();
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"lo!");
        assert_eq!(stream.tell().unwrap(), 6);
    }

    #[test]
    fn stream_skip_is_emulated_by_reading() {
        let stream = new_io_stream(b"0123456789").unwrap();
        stream.skip(4).unwrap();
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"45");
        let err = stream.skip(100).unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::UnexpectedEof);
    }

    #[test]
    fn fs_stream_rejects_members_after_end() {
        let fss = new_fs_stream().unwrap();
        let member = new_io_stream(b"x").unwrap();
        fss.add("a", &member.to_obj()).unwrap();
        fss.end().unwrap();
        let err = fss.add("b", &member.to_obj()).unwrap_err();
        assert_eq!(err.kind(), VfsErrorKind::InvalidInput);
        assert_eq!(fss.next().unwrap().map(|entry| entry.name), Some("a".to_owned()));
        assert!(fss.next().unwrap().is_none());
    }
}
