//! Byte-stream handles and the generic I/O layer.
//!
//! Backends implement a small [`VfsIoStreamOps`] contract; everything else
//! (scatter-gather emulation, skip, zero fill, end-of-stream probing, poll
//! retry) is layered on top here. Each public call holds the object's lock
//! for the duration of exactly one backend callback; the emulations run
//! inside that callback, calling the backend directly.

use crate::config::DEFAULT_IO_CHUNK_SIZE;
use crate::file::{VfsFile, VfsFileOps};
use crate::flags::{PollEvents, VfsOpsFeatures};
use crate::info::{VfsObjInfo, VfsObjType};
use crate::lock::{LockPolicy, VfsLock};
use crate::obj::{ObjCore, VfsObj, VfsObjOps, VfsOpsDescriptor, core_addr};
use crate::volume::VfsVolume;
use crate::{VfsError, VfsErrorKind, VfsResult};
use std::fmt;
use std::io::{self, IoSlice, IoSliceMut, SeekFrom};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::trace;

/// Outcome of a read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Transfer {
    pub bytes: usize,
    /// The stream is positioned at its end after this read.
    pub eof: bool,
}

impl Transfer {
    pub const fn new(bytes: usize, eof: bool) -> Self {
        Self { bytes, eof }
    }
}

/// Backend stream callbacks.
///
/// `offset` of `None` means the current position; backends that cannot
/// address absolute offsets reject `Some` with `NotSupported`. A zero-byte
/// read must report `eof` without consuming anything.
pub trait VfsIoStreamOps: VfsObjOps {
    fn read(&self, offset: Option<u64>, buf: &mut [u8], blocking: bool) -> VfsResult<Transfer>;

    /// Native scatter read; only called when the descriptor declares
    /// [`VfsOpsFeatures::SCATTER_GATHER`].
    fn read_sg(
        &self,
        _offset: Option<u64>,
        _bufs: &mut [IoSliceMut<'_>],
        _blocking: bool,
    ) -> VfsResult<Transfer> {
        Err(VfsError::new(VfsErrorKind::NotSupported, "io.read_sg"))
    }

    fn write(&self, offset: Option<u64>, buf: &[u8], blocking: bool) -> VfsResult<usize>;

    fn write_sg(
        &self,
        _offset: Option<u64>,
        _bufs: &[IoSlice<'_>],
        _blocking: bool,
    ) -> VfsResult<usize> {
        Err(VfsError::new(VfsErrorKind::NotSupported, "io.write_sg"))
    }

    fn flush(&self) -> VfsResult<()>;

    /// Wait up to `timeout` (forever when `None`) for one of `events`.
    /// Returns the events that are ready, `TimedOut`, or `Interrupted`.
    fn poll_one(
        &self,
        events: PollEvents,
        timeout: Option<Duration>,
        interruptible: bool,
    ) -> VfsResult<PollEvents>;

    fn tell(&self) -> VfsResult<u64>;

    /// `NotSupported` selects the generic emulation.
    fn skip(&self, _count: u64) -> VfsResult<()> {
        Err(VfsError::new(VfsErrorKind::NotSupported, "io.skip"))
    }

    /// `NotSupported` selects the generic emulation.
    fn zero_fill(&self, _count: u64) -> VfsResult<()> {
        Err(VfsError::new(VfsErrorKind::NotSupported, "io.zero_fill"))
    }
}

fn advance(offset: Option<u64>, by: usize) -> Option<u64> {
    offset.map(|off| off.saturating_add(by as u64))
}

pub(crate) fn dispatch_read_sg(
    ops: &dyn VfsIoStreamOps,
    features: VfsOpsFeatures,
    offset: Option<u64>,
    bufs: &mut [IoSliceMut<'_>],
    blocking: bool,
) -> VfsResult<Transfer> {
    if features.contains(VfsOpsFeatures::SCATTER_GATHER) {
        return ops.read_sg(offset, bufs, blocking);
    }
    let mut total = Transfer::default();
    for buf in bufs.iter_mut() {
        let wanted = buf.len();
        let step = ops.read(advance(offset, total.bytes), buf, blocking)?;
        total.bytes += step.bytes;
        total.eof = step.eof;
        if step.bytes < wanted {
            break;
        }
    }
    Ok(total)
}

pub(crate) fn dispatch_write_sg(
    ops: &dyn VfsIoStreamOps,
    features: VfsOpsFeatures,
    offset: Option<u64>,
    bufs: &[IoSlice<'_>],
    blocking: bool,
) -> VfsResult<usize> {
    if features.contains(VfsOpsFeatures::SCATTER_GATHER) {
        return ops.write_sg(offset, bufs, blocking);
    }
    let mut total = 0;
    for buf in bufs {
        let written = ops.write(advance(offset, total), buf, blocking)?;
        total += written;
        if written < buf.len() {
            break;
        }
    }
    Ok(total)
}

fn discard(ops: &dyn VfsIoStreamOps, count: u64) -> VfsResult<()> {
    let mut scratch = vec![0u8; DEFAULT_IO_CHUNK_SIZE.min(count as usize)];
    let mut left = count;
    while left > 0 {
        let want = scratch.len().min(left as usize);
        let step = ops.read(None, &mut scratch[..want], true)?;
        if step.bytes == 0 {
            return Err(VfsError::new(VfsErrorKind::UnexpectedEof, "io.skip.eof"));
        }
        left -= step.bytes as u64;
    }
    Ok(())
}

fn write_zeros(ops: &dyn VfsIoStreamOps, count: u64) -> VfsResult<()> {
    let zeros = vec![0u8; DEFAULT_IO_CHUNK_SIZE.min(count as usize)];
    let mut left = count;
    while left > 0 {
        let want = zeros.len().min(left as usize);
        let written = ops.write(None, &zeros[..want], true)?;
        if written == 0 {
            return Err(VfsError::new(VfsErrorKind::Io, "io.zero_fill.short"));
        }
        left -= written as u64;
    }
    Ok(())
}

fn fallback_on_unsupported(
    native: VfsResult<()>,
    emulate: impl FnOnce() -> VfsResult<()>,
) -> VfsResult<()> {
    match native {
        Err(err) if err.kind() == VfsErrorKind::NotSupported => emulate(),
        other => other,
    }
}

/// Either a plain stream or a file viewed as one.
#[derive(Clone)]
pub(crate) enum IoCore {
    Stream(Arc<ObjCore<dyn VfsIoStreamOps>>),
    File(Arc<ObjCore<dyn VfsFileOps>>),
}

#[derive(Clone)]
pub(crate) enum WeakIoCore {
    Stream(Weak<ObjCore<dyn VfsIoStreamOps>>),
    File(Weak<ObjCore<dyn VfsFileOps>>),
}

impl WeakIoCore {
    pub(crate) fn upgrade(&self) -> Option<IoCore> {
        match self {
            WeakIoCore::Stream(w) => w.upgrade().map(IoCore::Stream),
            WeakIoCore::File(w) => w.upgrade().map(IoCore::File),
        }
    }

    pub(crate) fn strong_count(&self) -> usize {
        match self {
            WeakIoCore::Stream(w) => w.strong_count(),
            WeakIoCore::File(w) => w.strong_count(),
        }
    }
}

impl IoCore {
    fn with_read<R>(
        &self,
        context: &'static str,
        f: impl FnOnce(&dyn VfsIoStreamOps) -> VfsResult<R>,
    ) -> VfsResult<R> {
        match self {
            IoCore::Stream(core) => core.with_read(context, |ops| f(ops)),
            IoCore::File(core) => core.with_read(context, |ops| f(ops)),
        }
    }

    fn with_write<R>(
        &self,
        context: &'static str,
        f: impl FnOnce(&dyn VfsIoStreamOps) -> VfsResult<R>,
    ) -> VfsResult<R> {
        match self {
            IoCore::Stream(core) => core.with_write(context, |ops| f(ops)),
            IoCore::File(core) => core.with_write(context, |ops| f(ops)),
        }
    }

    fn features(&self) -> VfsOpsFeatures {
        match self {
            IoCore::Stream(core) => core.features(),
            IoCore::File(core) => core.features(),
        }
    }

    fn descriptor(&self) -> &'static VfsOpsDescriptor {
        match self {
            IoCore::Stream(core) => core.ops().descriptor(),
            IoCore::File(core) => core.ops().descriptor(),
        }
    }

    fn strong_count(&self) -> usize {
        match self {
            IoCore::Stream(core) => Arc::strong_count(core),
            IoCore::File(core) => Arc::strong_count(core),
        }
    }

    fn addr(&self) -> usize {
        match self {
            IoCore::Stream(core) => core_addr(core),
            IoCore::File(core) => core_addr(core),
        }
    }
}

#[derive(Clone)]
pub struct VfsIoStream {
    core: IoCore,
}

impl VfsIoStream {
    pub fn new<T: VfsIoStreamOps>(
        ops: T,
        volume: Option<&VfsVolume>,
        lock: LockPolicy,
    ) -> VfsResult<Self> {
        let core: Arc<ObjCore<dyn VfsIoStreamOps>> =
            ObjCore::create(ops, VfsObjType::IoStream, volume, lock)?;
        Ok(Self {
            core: IoCore::Stream(core),
        })
    }

    pub(crate) fn from_io_core(core: IoCore) -> Self {
        Self { core }
    }

    pub fn retain(&self) -> Self {
        self.clone()
    }

    /// Drop this reference and return how many remain (a snapshot).
    pub fn release(self) -> usize {
        let remaining = self.core.strong_count().saturating_sub(1);
        drop(self);
        remaining
    }

    pub fn ref_count(&self) -> usize {
        self.core.strong_count()
    }

    pub fn query_info(&self) -> VfsResult<VfsObjInfo> {
        match &self.core {
            IoCore::Stream(core) => core.query_info(),
            IoCore::File(core) => core.query_info(),
        }
    }

    pub fn lock(&self) -> Option<&VfsLock> {
        match &self.core {
            IoCore::Stream(core) => core.lock(),
            IoCore::File(core) => core.lock(),
        }
    }

    pub fn volume(&self) -> Option<&VfsVolume> {
        match &self.core {
            IoCore::Stream(core) => core.volume(),
            IoCore::File(core) => core.volume(),
        }
    }

    pub fn instance<T: 'static>(&self) -> Option<&T> {
        match &self.core {
            IoCore::Stream(core) => core.instance::<T>(),
            IoCore::File(core) => core.instance::<T>(),
        }
    }

    pub fn descriptor(&self) -> &'static VfsOpsDescriptor {
        self.core.descriptor()
    }

    /// The file behind this stream, if it is one.
    pub fn to_file(&self) -> Option<VfsFile> {
        match &self.core {
            IoCore::File(core) => Some(VfsFile::from_core(core.clone())),
            IoCore::Stream(_) => None,
        }
    }

    pub fn to_obj(&self) -> VfsObj {
        VfsObj::from_io_stream(self)
    }

    pub fn same_object(&self, other: &VfsIoStream) -> bool {
        self.addr() == other.addr()
    }

    pub(crate) fn addr(&self) -> usize {
        self.core.addr()
    }

    pub(crate) fn downgrade_core(&self) -> WeakIoCore {
        match &self.core {
            IoCore::Stream(core) => WeakIoCore::Stream(Arc::downgrade(core)),
            IoCore::File(core) => WeakIoCore::File(Arc::downgrade(core)),
        }
    }

    /// Blocking read at the current position.
    pub fn read(&self, buf: &mut [u8]) -> VfsResult<Transfer> {
        self.core.with_write("io.read", |ops| ops.read(None, buf, true))
    }

    /// Non-blocking read; a backend with nothing buffered yields `WouldBlock`.
    pub fn try_read(&self, buf: &mut [u8]) -> VfsResult<Transfer> {
        self.core.with_write("io.try_read", |ops| ops.read(None, buf, false))
    }

    /// Fill `buf` completely or fail with `UnexpectedEof`.
    pub fn read_exact(&self, mut buf: &mut [u8]) -> VfsResult<()> {
        while !buf.is_empty() {
            let step = self.read(buf)?;
            if step.bytes == 0 {
                return Err(VfsError::new(VfsErrorKind::UnexpectedEof, "io.read_exact"));
            }
            buf = &mut buf[step.bytes..];
        }
        Ok(())
    }

    pub fn read_sg(&self, bufs: &mut [IoSliceMut<'_>]) -> VfsResult<Transfer> {
        let features = self.core.features();
        self.core.with_write("io.read_sg", |ops| {
            dispatch_read_sg(ops, features, None, bufs, true)
        })
    }

    /// Read until end of stream, appending to `out`.
    pub fn read_to_end(&self, out: &mut Vec<u8>) -> VfsResult<usize> {
        let mut chunk = vec![0u8; 8 * 1024];
        let mut total = 0;
        loop {
            let step = self.read(&mut chunk)?;
            out.extend_from_slice(&chunk[..step.bytes]);
            total += step.bytes;
            if step.eof || step.bytes == 0 {
                return Ok(total);
            }
        }
    }

    pub fn write(&self, buf: &[u8]) -> VfsResult<usize> {
        self.core.with_write("io.write", |ops| ops.write(None, buf, true))
    }

    pub fn write_all(&self, mut buf: &[u8]) -> VfsResult<()> {
        while !buf.is_empty() {
            let written = self.write(buf)?;
            if written == 0 {
                return Err(VfsError::new(VfsErrorKind::Io, "io.write_all.zero"));
            }
            buf = &buf[written..];
        }
        Ok(())
    }

    pub fn write_sg(&self, bufs: &[IoSlice<'_>]) -> VfsResult<usize> {
        let features = self.core.features();
        self.core.with_write("io.write_sg", |ops| {
            dispatch_write_sg(ops, features, None, bufs, true)
        })
    }

    pub fn flush(&self) -> VfsResult<()> {
        self.core.with_write("io.flush", |ops| ops.flush())
    }

    /// Wait for `events`. A non-interruptible wait that gets interrupted is
    /// retried with whatever time remains; an interruptible one reports
    /// `Interrupted` straight away. A timeout too large to express as a
    /// deadline waits forever.
    pub fn poll(
        &self,
        events: PollEvents,
        timeout: Option<Duration>,
        interruptible: bool,
    ) -> VfsResult<PollEvents> {
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        loop {
            let remaining = deadline.map(|at| at.saturating_duration_since(Instant::now()));
            let result = self.core.with_write("io.poll", |ops| {
                ops.poll_one(events, remaining, interruptible)
            });
            match result {
                Err(err) if err.kind() == VfsErrorKind::Interrupted && !interruptible => {
                    if deadline.is_some_and(|at| Instant::now() >= at) {
                        return Err(VfsError::new(VfsErrorKind::TimedOut, "io.poll"));
                    }
                    trace!(ops = self.descriptor().name, "poll interrupted, retrying");
                }
                other => return other,
            }
        }
    }

    pub fn tell(&self) -> VfsResult<u64> {
        self.core.with_read("io.tell", |ops| ops.tell())
    }

    /// Advance the position by `count` bytes. Uses the backend's native
    /// skip, then a seek for files, then reads and discards.
    pub fn skip(&self, count: u64) -> VfsResult<()> {
        if count == 0 {
            return Ok(());
        }
        match &self.core {
            IoCore::File(core) => core.with_write("io.skip", |ops| {
                fallback_on_unsupported(ops.skip(count), || {
                    let target = ops
                        .tell()?
                        .checked_add(count)
                        .ok_or(VfsError::new(VfsErrorKind::InvalidInput, "io.skip.overflow"))?;
                    ops.seek(SeekFrom::Start(target)).map(|_| ())
                })
            }),
            IoCore::Stream(core) => core.with_write("io.skip", |ops| {
                fallback_on_unsupported(ops.skip(count), || discard(ops, count))
            }),
        }
    }

    /// Write `count` zero bytes at the current position.
    pub fn zero_fill(&self, count: u64) -> VfsResult<()> {
        if count == 0 {
            return Ok(());
        }
        self.core.with_write("io.zero_fill", |ops| {
            fallback_on_unsupported(ops.zero_fill(count), || write_zeros(ops, count))
        })
    }

    /// Probe for end of stream with a zero-byte read; nothing is consumed.
    pub fn is_at_end(&self) -> VfsResult<bool> {
        self.core.with_write("io.is_at_end", |ops| {
            ops.read(None, &mut [], true).map(|step| step.eof)
        })
    }
}

impl fmt::Debug for VfsIoStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VfsIoStream")
            .field("ops", &self.descriptor().name)
            .field("refs", &self.ref_count())
            .field("file", &matches!(self.core, IoCore::File(_)))
            .finish()
    }
}

impl From<VfsIoStream> for VfsObj {
    fn from(stream: VfsIoStream) -> Self {
        VfsObj::from_io_stream(&stream)
    }
}

impl io::Read for &VfsIoStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(VfsIoStream::read(self, buf)?.bytes)
    }
}

impl io::Write for &VfsIoStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(VfsIoStream::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(VfsIoStream::flush(self)?)
    }
}
