//! File handles: seekable I/O streams with a size.

use crate::info::VfsObjType;
use crate::io::{IoCore, Transfer, VfsIoStream, VfsIoStreamOps, dispatch_read_sg, dispatch_write_sg};
use crate::lock::LockPolicy;
use crate::obj::{ObjCore, VfsObjSetOps, impl_handle};
use crate::volume::VfsVolume;
use crate::{VfsError, VfsErrorKind, VfsResult};
use std::io::{self, IoSlice, IoSliceMut, SeekFrom};
use std::sync::Arc;

pub trait VfsFileOps: VfsIoStreamOps {
    /// Move the position and return the new absolute offset.
    fn seek(&self, pos: SeekFrom) -> VfsResult<u64>;

    fn query_size(&self) -> VfsResult<u64>;

    fn set_size(&self, _size: u64) -> VfsResult<()> {
        Err(VfsError::new(VfsErrorKind::NotSupported, "file.set_size"))
    }

    fn query_max_size(&self) -> VfsResult<u64> {
        Err(VfsError::new(VfsErrorKind::NotSupported, "file.query_max_size"))
    }

    fn set_ops(&self) -> Option<&dyn VfsObjSetOps> {
        None
    }
}

#[derive(Clone)]
pub struct VfsFile {
    pub(crate) core: Arc<ObjCore<dyn VfsFileOps>>,
}

impl_handle!(VfsFile, VfsFileOps, File);

impl VfsFile {
    pub fn new<T: VfsFileOps>(
        ops: T,
        volume: Option<&VfsVolume>,
        lock: LockPolicy,
    ) -> VfsResult<Self> {
        let core: Arc<ObjCore<dyn VfsFileOps>> =
            ObjCore::create(ops, VfsObjType::File, volume, lock)?;
        Ok(Self { core })
    }

    /// View this file as a plain stream; the stream shares the object.
    pub fn to_io_stream(&self) -> VfsIoStream {
        VfsIoStream::from_io_core(IoCore::File(self.core.clone()))
    }

    pub fn seek(&self, pos: SeekFrom) -> VfsResult<u64> {
        self.core.with_write("file.seek", |ops| ops.seek(pos))
    }

    pub fn tell(&self) -> VfsResult<u64> {
        self.core.with_read("file.tell", |ops| ops.tell())
    }

    pub fn size(&self) -> VfsResult<u64> {
        self.core.with_read("file.query_size", |ops| ops.query_size())
    }

    pub fn max_size(&self) -> VfsResult<u64> {
        self.core.with_read("file.query_max_size", |ops| ops.query_max_size())
    }

    pub fn set_size(&self, size: u64) -> VfsResult<()> {
        self.core.with_write("file.set_size", |ops| ops.set_size(size))
    }

    /// Positional read; does not move the stream position.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> VfsResult<Transfer> {
        self.core.with_write("file.read_at", |ops| ops.read(Some(offset), buf, true))
    }

    pub fn write_at(&self, offset: u64, buf: &[u8]) -> VfsResult<usize> {
        self.core.with_write("file.write_at", |ops| ops.write(Some(offset), buf, true))
    }

    pub fn read_sg_at(&self, offset: u64, bufs: &mut [IoSliceMut<'_>]) -> VfsResult<Transfer> {
        let features = self.core.features();
        self.core.with_write("file.read_sg_at", |ops| {
            dispatch_read_sg(ops, features, Some(offset), bufs, true)
        })
    }

    pub fn write_sg_at(&self, offset: u64, bufs: &[IoSlice<'_>]) -> VfsResult<usize> {
        let features = self.core.features();
        self.core.with_write("file.write_sg_at", |ops| {
            dispatch_write_sg(ops, features, Some(offset), bufs, true)
        })
    }

    /// Read the whole file from offset zero.
    pub fn read_all(&self) -> VfsResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.size()? as usize);
        let mut chunk = vec![0u8; 8 * 1024];
        loop {
            let step = self.read_at(out.len() as u64, &mut chunk)?;
            out.extend_from_slice(&chunk[..step.bytes]);
            if step.eof || step.bytes == 0 {
                return Ok(out);
            }
        }
    }
}

impl io::Read for &VfsFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.to_io_stream().read(buf)?.bytes)
    }
}

impl io::Write for &VfsFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.to_io_stream().write(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.to_io_stream().flush()?)
    }
}

impl io::Seek for &VfsFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(VfsFile::seek(self, pos)?)
    }
}
