use crate::fs::{MemFsInner, MemFsState, NodeHandle, NodeKind, NodeRef};
use parking_lot::Mutex;
use std::io::{IoSlice, IoSliceMut, SeekFrom};
use std::sync::Arc;
use std::time::Duration;
use vfsobj_core::util::dummy_poll_one;
use vfsobj_core::{
    LockPolicy, OpenFlags, PollEvents, Transfer, VfsError, VfsErrorKind, VfsFile, VfsFileOps,
    VfsIoStreamOps, VfsObjInfo, VfsObjOps, VfsObjSetOps, VfsObjType, VfsOpsDescriptor,
    VfsOpsFeatures, VfsResult, VfsTimespec, VfsVolume,
};

static MEM_FILE_OPS: VfsOpsDescriptor = VfsOpsDescriptor::new(
    "memfs-file",
    VfsObjType::File,
    VfsOpsFeatures::SCATTER_GATHER,
);

/// Largest length a file can reach; buffers are capped at `isize::MAX`.
const MAX_FILE_SIZE: u64 = isize::MAX as u64;

/// An open regular file. Scatter-gather is native; skip is left to the
/// generic seek emulation.
pub(crate) struct MemFile {
    handle: NodeHandle,
    flags: OpenFlags,
    pos: Mutex<u64>,
}

impl MemFile {
    pub(crate) fn open(
        fs: &Arc<MemFsInner>,
        node: NodeRef,
        flags: OpenFlags,
        volume: Option<&VfsVolume>,
    ) -> VfsResult<VfsFile> {
        let file = MemFile {
            handle: NodeHandle::new(fs, node),
            flags,
            pos: Mutex::new(0),
        };
        let file = VfsFile::new(file, volume, LockPolicy::Inherit)?;
        fs.opened();
        Ok(file)
    }

    fn data<'a>(&self, state: &'a MemFsState) -> VfsResult<&'a [u8]> {
        match &state.get(self.handle.node, "mem.file.stale")?.kind {
            NodeKind::File { data } => Ok(data),
            _ => Err(VfsError::new(VfsErrorKind::Internal, "mem.file.kind")),
        }
    }

    fn check_readable(&self) -> VfsResult<()> {
        if self.flags.contains(OpenFlags::READ) {
            Ok(())
        } else {
            Err(VfsError::new(VfsErrorKind::PermissionDenied, "mem.file.read"))
        }
    }

    fn check_writable(&self) -> VfsResult<()> {
        if self.flags.wants_write() {
            Ok(())
        } else {
            Err(VfsError::new(VfsErrorKind::PermissionDenied, "mem.file.write"))
        }
    }

    /// Copy out of the file into `bufs` starting at `start`.
    fn read_into(&self, offset: Option<u64>, bufs: &mut [&mut [u8]]) -> VfsResult<Transfer> {
        self.check_readable()?;
        let state = self.handle.fs.state.read();
        let data = self.data(&state)?;
        let mut pos = self.pos.lock();
        let start = usize::try_from(offset.unwrap_or(*pos)).unwrap_or(usize::MAX);
        let mut at = start.min(data.len());
        for buf in bufs.iter_mut() {
            let n = buf.len().min(data.len() - at);
            buf[..n].copy_from_slice(&data[at..at + n]);
            at += n;
            if n < buf.len() {
                break;
            }
        }
        let read = at - start.min(data.len());
        if offset.is_none() {
            *pos = (start + read) as u64;
        }
        Ok(Transfer::new(read, start + read >= data.len()))
    }

    /// Copy `bufs` into the file at `offset` (or the position / end).
    fn write_from(&self, offset: Option<u64>, bufs: &[&[u8]]) -> VfsResult<usize> {
        self.check_writable()?;
        let total: usize = bufs.iter().map(|buf| buf.len()).sum();
        let fs = &self.handle.fs;
        let mut state = fs.state.write();
        let old_len = self.data(&state)?.len();
        let mut pos = self.pos.lock();
        let start = match offset {
            Some(offset) => offset,
            None if self.flags.contains(OpenFlags::APPEND) => old_len as u64,
            None => *pos,
        };
        let (start, end) = write_range(start, total)?;
        let node = if end > old_len {
            state.resize_file(&fs.config, self.handle.node, end, "mem.file.write")?
        } else {
            state.get_mut(self.handle.node, "mem.file.write")?
        };
        if let NodeKind::File { data } = &mut node.kind {
            let mut at = start;
            for buf in bufs {
                data[at..at + buf.len()].copy_from_slice(buf);
                at += buf.len();
            }
        }
        node.mtime = VfsTimespec::now();
        if offset.is_none() {
            *pos = end as u64;
        }
        Ok(total)
    }
}

/// Buffer indices `start..end` for a write of `len` bytes at `offset`.
fn write_range(offset: u64, len: usize) -> VfsResult<(usize, usize)> {
    usize::try_from(offset)
        .ok()
        .and_then(|start| Some((start, start.checked_add(len)?)))
        .filter(|&(_, end)| end <= MAX_FILE_SIZE as usize)
        .ok_or(VfsError::new(VfsErrorKind::InvalidInput, "mem.file.range"))
}

impl VfsObjOps for MemFile {
    fn descriptor(&self) -> &'static VfsOpsDescriptor {
        &MEM_FILE_OPS
    }

    fn close(&self) -> VfsResult<()> {
        self.handle.fs.closed();
        Ok(())
    }

    fn query_info(&self) -> VfsResult<VfsObjInfo> {
        self.handle.info()
    }
}

impl VfsIoStreamOps for MemFile {
    fn read(&self, offset: Option<u64>, buf: &mut [u8], _blocking: bool) -> VfsResult<Transfer> {
        self.read_into(offset, &mut [buf])
    }

    fn read_sg(
        &self,
        offset: Option<u64>,
        bufs: &mut [IoSliceMut<'_>],
        _blocking: bool,
    ) -> VfsResult<Transfer> {
        let mut slices: Vec<&mut [u8]> = bufs.iter_mut().map(|buf| &mut **buf).collect();
        self.read_into(offset, &mut slices)
    }

    fn write(&self, offset: Option<u64>, buf: &[u8], _blocking: bool) -> VfsResult<usize> {
        self.write_from(offset, &[buf])
    }

    fn write_sg(
        &self,
        offset: Option<u64>,
        bufs: &[IoSlice<'_>],
        _blocking: bool,
    ) -> VfsResult<usize> {
        let slices: Vec<&[u8]> = bufs.iter().map(|buf| &**buf).collect();
        self.write_from(offset, &slices)
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
        dummy_poll_one(PollEvents::READ | PollEvents::WRITE, events, timeout, interruptible)
    }

    fn tell(&self) -> VfsResult<u64> {
        Ok(*self.pos.lock())
    }
}

impl VfsFileOps for MemFile {
    fn seek(&self, from: SeekFrom) -> VfsResult<u64> {
        let state = self.handle.fs.state.read();
        let len = self.data(&state)?.len() as i128;
        let mut pos = self.pos.lock();
        let next = match from {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => *pos as i128 + delta as i128,
            SeekFrom::End(delta) => len + delta as i128,
        };
        if next < 0 || next > u64::MAX as i128 {
            return Err(VfsError::new(VfsErrorKind::InvalidInput, "mem.file.seek"));
        }
        *pos = next as u64;
        Ok(*pos)
    }

    fn query_size(&self) -> VfsResult<u64> {
        let state = self.handle.fs.state.read();
        Ok(self.data(&state)?.len() as u64)
    }

    fn set_size(&self, size: u64) -> VfsResult<()> {
        self.check_writable()?;
        let fs = &self.handle.fs;
        let mut state = fs.state.write();
        if size > MAX_FILE_SIZE {
            return Err(VfsError::new(VfsErrorKind::InvalidInput, "mem.file.set_size"));
        }
        let node =
            state.resize_file(&fs.config, self.handle.node, size as usize, "mem.file.set_size")?;
        node.mtime = VfsTimespec::now();
        Ok(())
    }

    fn query_max_size(&self) -> VfsResult<u64> {
        Ok(self.handle.fs.config.max_bytes.unwrap_or(MAX_FILE_SIZE))
    }

    fn set_ops(&self) -> Option<&dyn VfsObjSetOps> {
        Some(&self.handle)
    }
}
