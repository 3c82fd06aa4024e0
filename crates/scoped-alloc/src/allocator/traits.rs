//! Allocator capability traits
//!
//! The whole crate speaks one small allocator contract:
//! - `Allocator`: allocate by size, free by pointer, in-place-only realloc
//! - `ScopedAllocator`: an allocator instance that can be bulk-reset and
//!   handed back to whoever owns it when a scope ends
//! - `AllocationTracker`: passive client-byte accounting
//!
//! Unlike `core::alloc::GlobalAlloc`, `free` takes no layout. Every allocator
//! that needs the size back records it in a header in front of the block
//! (see [`header`](super::header)).
//!
//! # Safety
//!
//! ## Trait Safety Contracts
//!
//! - **Allocator**: returned pointers are non-null, aligned to
//!   [`DEFAULT_ALIGN`](crate::core::alignment::DEFAULT_ALIGN), valid for
//!   reads and writes of the requested size and exclusive to the caller until
//!   freed.
//! - `free` and `try_realloc` only accept pointers previously returned by
//!   the same allocator instance and not yet freed.

use core::ptr::NonNull;
use std::sync::Arc;

use crate::error::AllocResult;

/// Shared handle to an allocator
pub type AllocatorRef = Arc<dyn Allocator>;

/// Outcome of a successful in-place (or, for the native allocator, moving)
/// reallocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reallocated {
    /// Pointer to use from now on
    pub ptr: NonNull<u8>,
    /// Client-visible size actually granted (`min_size..=max_size`)
    pub size: usize,
}

/// Allocator capability
///
/// # Safety
///
/// Implementors must ensure that:
/// - Returned pointers satisfy the platform default alignment
/// - Two live allocations never overlap
/// - `metadata_overhead` is the exact number of bytes reserved in front of
///   every allocation
pub unsafe trait Allocator: Send + Sync {
    /// Allocates `size` bytes of uninitialized memory
    ///
    /// # Errors
    /// - [`MemoryError::SizeOverflow`](crate::MemoryError::SizeOverflow) if
    ///   `size` plus overhead cannot be represented
    /// - [`MemoryError::AllocationFailed`](crate::MemoryError::AllocationFailed)
    ///   if the platform allocator is out of memory
    fn allocate(&self, size: usize) -> AllocResult<NonNull<u8>>;

    /// Frees a block. Freeing null is a no-op.
    ///
    /// # Safety
    /// - `ptr` is null or was returned by this allocator and not freed since
    unsafe fn free(&self, ptr: *mut u8);

    /// Attempts to resize a block cheaply
    ///
    /// Arenas and the pooling cache only ever resize in place. Returns `None`
    /// when this cannot be done; the caller then falls back to
    /// allocate + copy + free. On `None` the old block is untouched.
    ///
    /// # Safety
    /// - `ptr` was returned by this allocator and not freed since
    /// - `min_size <= max_size`
    unsafe fn try_realloc(
        &self,
        ptr: NonNull<u8>,
        min_size: usize,
        max_size: usize,
    ) -> Option<Reallocated>;

    /// Bytes reserved in front of every allocation
    fn metadata_overhead(&self) -> usize;
}

/// An allocator instance owned by a scope
///
/// Scope managers push these onto a flow's stack; when the scope closes the
/// instance is released, which frees everything it handed out.
pub trait ScopedAllocator: Allocator {
    /// Frees every outstanding allocation at once
    fn free_all_allocations(&self);

    /// Hands the instance back to its owner
    ///
    /// Implementations reset themselves first. If other references to the
    /// instance are still alive it must not be recycled; it is disposed.
    fn release(self: Arc<Self>) {
        self.free_all_allocations();
    }
}

/// Passive client-byte accounting
///
/// Implemented by the owners of allocator instances (instance pools,
/// providers) to aggregate client traffic across many instances.
pub trait AllocationTracker: Send + Sync {
    /// Records `bytes` handed out to a client
    fn client_allocate(&self, bytes: usize);

    /// Records `bytes` given back by a client
    fn client_free(&self, bytes: usize);
}

/// Blanket implementation for shared trackers
impl<T: AllocationTracker + ?Sized> AllocationTracker for Arc<T> {
    fn client_allocate(&self, bytes: usize) {
        (**self).client_allocate(bytes);
    }

    fn client_free(&self, bytes: usize) {
        (**self).client_free(bytes);
    }
}

// SAFETY: forwards to the shared allocator; contracts are preserved by
// delegation.
unsafe impl<A: Allocator + ?Sized> Allocator for Arc<A> {
    fn allocate(&self, size: usize) -> AllocResult<NonNull<u8>> {
        (**self).allocate(size)
    }

    unsafe fn free(&self, ptr: *mut u8) {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { (**self).free(ptr) }
    }

    unsafe fn try_realloc(
        &self,
        ptr: NonNull<u8>,
        min_size: usize,
        max_size: usize,
    ) -> Option<Reallocated> {
        // SAFETY: caller contract forwarded unchanged.
        unsafe { (**self).try_realloc(ptr, min_size, max_size) }
    }

    fn metadata_overhead(&self) -> usize {
        (**self).metadata_overhead()
    }
}
