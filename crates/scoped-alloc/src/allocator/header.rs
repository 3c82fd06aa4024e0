//! Block headers
//!
//! Every allocator that needs to recover a block's size from a bare pointer
//! writes a small fixed header immediately before the pointer it returns:
//!
//! ```text
//! base                       ptr (returned to the client)
//! |<-- OVERHEAD (aligned) -->|<-- requested bytes ... -->|
//! | header | padding         | payload                   |
//! ```
//!
//! `OVERHEAD` is the header size rounded up to
//! [`DEFAULT_ALIGN`], so when `base` is aligned the payload is aligned too.
//! All pointer arithmetic on headers stays inside this module.
//!
//! # Safety
//!
//! Every function here requires that `ptr` is a payload pointer produced by
//! [`BlockHeader::install`] for the same header type and that the block has
//! not been released to the inner allocator.

use core::mem::size_of;
use core::ptr::{self, NonNull};

use crate::core::alignment::DEFAULT_ALIGN;
use crate::utils::align_up;

/// A fixed-size record stored in front of every payload
pub(crate) trait BlockHeader: Copy + Sized {
    /// Bytes reserved in front of the payload
    const OVERHEAD: usize = align_up(size_of::<Self>(), DEFAULT_ALIGN);

    /// Writes `header` at `base` and returns the payload pointer
    ///
    /// # Safety
    /// `base` must be aligned to `DEFAULT_ALIGN` and valid for writes of at
    /// least `OVERHEAD` bytes.
    #[inline]
    unsafe fn install(base: NonNull<u8>, header: Self) -> NonNull<u8> {
        debug_assert_eq!(base.as_ptr() as usize % DEFAULT_ALIGN, 0);
        // SAFETY: caller guarantees `base` is aligned and writable for the
        // header; OVERHEAD >= size_of::<Self>().
        unsafe {
            base.cast::<Self>().write(header);
            base.add(Self::OVERHEAD)
        }
    }

    /// Start of the block that `ptr` is the payload of
    ///
    /// # Safety
    /// See the module docs.
    #[inline]
    unsafe fn base_of(ptr: NonNull<u8>) -> NonNull<u8> {
        // SAFETY: payloads always sit OVERHEAD bytes after their base.
        unsafe { ptr.sub(Self::OVERHEAD) }
    }

    /// Reads the header belonging to `ptr`
    ///
    /// # Safety
    /// See the module docs.
    #[inline]
    unsafe fn read(ptr: NonNull<u8>) -> Self {
        // SAFETY: the header was written by `install` at `base_of(ptr)`.
        unsafe { ptr::read(Self::base_of(ptr).cast::<Self>().as_ptr()) }
    }

    /// Mutable access to the header belonging to `ptr`
    ///
    /// # Safety
    /// See the module docs. The caller must hold whatever lock guards the
    /// block's owner and must not create overlapping references.
    #[inline]
    unsafe fn get_mut<'a>(ptr: NonNull<u8>) -> &'a mut Self {
        // SAFETY: the header was written by `install` at `base_of(ptr)`.
        unsafe { &mut *Self::base_of(ptr).cast::<Self>().as_ptr() }
    }
}

/// Arena block header
///
/// `next` links freed blocks of the same allocation size; it is null while
/// the block is live.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct ArenaHeader {
    pub arena_id: u32,
    pub requested: usize,
    pub next: *mut u8,
}

impl BlockHeader for ArenaHeader {}

impl ArenaHeader {
    #[inline]
    pub(crate) const fn live(arena_id: u32, requested: usize) -> Self {
        Self {
            arena_id,
            requested,
            next: ptr::null_mut(),
        }
    }
}

/// Pooling cache block header
///
/// `alloc_size` is the size class the block was carved for, including the
/// header itself.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct CacheHeader {
    pub requested: usize,
    pub alloc_size: usize,
}

impl BlockHeader for CacheHeader {}

/// Size-only header used by [`TrackedAllocator`](super::TrackedAllocator)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct SizeHeader {
    pub requested: usize,
}

impl BlockHeader for SizeHeader {}
