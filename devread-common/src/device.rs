//! Read access to a block device (or a regular file standing in for one).

use std::{
    io::{self, Read, Seek, SeekFrom},
    os::unix::fs::FileExt,
};

/// A readable device handle that can be read at an explicit byte offset.
///
/// The offset is the benchmark's own cursor; implementations decide how to
/// honour it (a positional read, or a seek followed by a plain read).
pub trait BlockDevice {
    /// Issue a single read of up to `buf.len()` bytes at `offset`.
    ///
    /// Returns the number of bytes the OS handed back; callers treat anything
    /// short of `buf.len()` as a failed read.
    fn read_block(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
}

impl<D: BlockDevice + ?Sized> BlockDevice for Box<D> {
    fn read_block(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_block(offset, buf)
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn read_block(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_block(offset, buf)
    }
}

/// Reads with `pread(2)`; the kernel's file position is never consulted.
#[derive(Debug)]
pub struct Positional<F> {
    file: F,
}

impl<F: FileExt> Positional<F> {
    pub fn new(file: F) -> Self {
        Positional { file }
    }
}

impl<F: FileExt> BlockDevice for Positional<F> {
    #[inline(always)]
    fn read_block(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read_at(buf, offset)
    }
}

/// Reads with `read(2)`, seeking only when the requested offset differs from
/// where the previous read left the handle (i.e. after a wraparound).
#[derive(Debug)]
pub struct Sequential<R> {
    inner: R,
    pos: u64,
}

impl<R: Read + Seek> Sequential<R> {
    /// Wraps `inner`, rewinding it to the start.
    pub fn new(mut inner: R) -> io::Result<Self> {
        inner.seek(SeekFrom::Start(0))?;
        Ok(Sequential { inner, pos: 0 })
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> BlockDevice for Sequential<R> {
    fn read_block(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset != self.pos {
            tracing::trace!(from = self.pos, to = offset, "repositioning");
            self.pos = self.inner.seek(SeekFrom::Start(offset))?;
        }
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

/// Total addressable size of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSize {
    Known(u64),
    /// Size could not be determined; reads run until the device itself refuses.
    Unbounded,
}

impl DeviceSize {
    /// Whether a read of `len` bytes at `offset` stays within the device.
    #[inline]
    pub fn fits(&self, offset: u64, len: u64) -> bool {
        match *self {
            DeviceSize::Known(size) => size
                .checked_sub(offset)
                .map_or(false, |remaining| len <= remaining),
            DeviceSize::Unbounded => true,
        }
    }

    pub fn known(&self) -> Option<u64> {
        match *self {
            DeviceSize::Known(size) => Some(size),
            DeviceSize::Unbounded => None,
        }
    }
}

impl std::fmt::Display for DeviceSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceSize::Known(size) => write!(f, "{size}"),
            DeviceSize::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// Determine the size of `handle` by seeking to its end, then rewind.
///
/// Character devices report an end offset of 0, and pipes can't seek at all;
/// both come back as [`DeviceSize::Unbounded`].
pub fn probe_size<S: Seek>(handle: &mut S) -> io::Result<DeviceSize> {
    let end = match handle.seek(SeekFrom::End(0)) {
        Ok(end) => end,
        Err(e) => {
            tracing::debug!(error = %e, "cannot seek to end, treating device size as unbounded");
            return Ok(DeviceSize::Unbounded);
        }
    };
    handle.seek(SeekFrom::Start(0))?;
    Ok(match end {
        0 => DeviceSize::Unbounded,
        n => DeviceSize::Known(n),
    })
}
