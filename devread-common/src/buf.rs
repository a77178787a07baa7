//! Page-aligned read buffers.
//!
//! `O_DIRECT` reads require the destination to start on a page boundary.
//! [`AlignedBuf`] over-allocates by `alignment - 1` bytes and exposes the
//! aligned window inside that allocation, so the guarantee holds no matter
//! where the allocator placed the raw block.

use std::{
    alloc::Layout,
    ops::{Deref, DerefMut},
    ptr::NonNull,
};

/// Capacity of the benchmark's read buffer. Also the granularity to which
/// the per-iteration transfer size is rounded down.
pub const CHUNK: usize = 1 << 20;

#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    #[error("cannot allocate a zero-sized buffer")]
    ZeroCapacity,
    #[error("alignment {0} is not a power of two")]
    InvalidAlignment(usize),
    #[error("no valid layout for {size} bytes")]
    InvalidLayout { size: usize },
    #[error("unable to allocate {size} bytes")]
    OutOfMemory { size: usize },
}

/// The system page size, falling back to 4KiB if `sysconf` can't tell.
pub fn page_size() -> usize {
    match nix::unistd::sysconf(nix::unistd::SysconfVar::PAGE_SIZE) {
        Ok(Some(sz)) if sz > 0 => sz as usize,
        _ => 4096,
    }
}

/// Round `addr` up to the next multiple of `align`, which must be a power of two.
#[inline]
pub const fn align_up(addr: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (addr + (align - 1)) & !(align - 1)
}

/// An owned, zero-initialized buffer whose first byte sits on an `alignment` boundary.
pub struct AlignedBuf {
    raw: NonNull<u8>,
    raw_layout: Layout,
    offset: usize,
    len: usize,
    alignment: usize,
}

// SAFETY: we exclusively own the allocation; no interior pointers escape except through borrows.
unsafe impl Send for AlignedBuf {}
// SAFETY: shared access only hands out `&[u8]`.
unsafe impl Sync for AlignedBuf {}

impl AlignedBuf {
    /// Allocate `capacity` bytes aligned to the system page size.
    pub fn new(capacity: usize) -> Result<Self, AllocError> {
        Self::with_alignment(capacity, page_size())
    }

    pub fn with_alignment(capacity: usize, alignment: usize) -> Result<Self, AllocError> {
        if capacity == 0 {
            return Err(AllocError::ZeroCapacity);
        }
        if !alignment.is_power_of_two() {
            return Err(AllocError::InvalidAlignment(alignment));
        }
        let raw_size = capacity
            .checked_add(alignment - 1)
            .ok_or(AllocError::InvalidLayout { size: capacity })?;
        let raw_layout = Layout::from_size_align(raw_size, 1)
            .map_err(|_| AllocError::InvalidLayout { size: raw_size })?;
        // SAFETY: the layout has a non-zero size.
        let raw = unsafe { std::alloc::alloc_zeroed(raw_layout) };
        let raw = NonNull::new(raw).ok_or(AllocError::OutOfMemory { size: raw_size })?;

        let addr = raw.as_ptr() as usize;
        let offset = align_up(addr, alignment) - addr;
        debug_assert!(offset + capacity <= raw_size);
        tracing::trace!(capacity, alignment, offset, "allocated aligned buffer");

        Ok(AlignedBuf {
            raw,
            raw_layout,
            offset,
            len: capacity,
            alignment,
        })
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Pointer to the start of the raw allocation backing this buffer.
    pub fn raw_ptr(&self) -> *const u8 {
        self.raw.as_ptr()
    }

    pub fn as_ptr(&self) -> *const u8 {
        // SAFETY: `offset` stays within the allocation, see `with_alignment`.
        unsafe { self.raw.as_ptr().add(self.offset) }
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        // SAFETY: as above.
        unsafe { self.raw.as_ptr().add(self.offset) }
    }

    /// The first `len` bytes of the buffer.
    ///
    /// Panics if `len` exceeds the capacity.
    pub fn prefix_mut(&mut self, len: usize) -> &mut [u8] {
        &mut self[..len]
    }
}

impl Deref for AlignedBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: `len` bytes starting at the aligned pointer are allocated and zero-initialized.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len) }
    }
}

impl DerefMut for AlignedBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as in `deref`, and `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.as_mut_ptr(), self.len) }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        // SAFETY: `raw` was allocated with `raw_layout` and is released exactly once.
        unsafe { std::alloc::dealloc(self.raw.as_ptr(), self.raw_layout) }
    }
}

impl std::fmt::Debug for AlignedBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuf")
            .field("ptr", &self.as_ptr())
            .field("len", &self.len)
            .field("alignment", &self.alignment)
            .finish()
    }
}
