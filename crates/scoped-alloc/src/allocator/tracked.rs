//! Tracked allocator implementation
//!
//! Provides an allocator that tracks memory usage statistics
//! by wrapping another allocator implementation.
//!
//! # Safety
//!
//! - Each block carries a [`SizeHeader`] so `free` can account the exact
//!   requested size without the caller passing it back
//! - All unsafe operations are forwarded to the inner allocator on the block
//!   base, never on the payload pointer
//! - Statistics collection is thread-safe via atomic operations

use core::ptr::NonNull;

use super::header::{BlockHeader, SizeHeader};
use super::{AllocResult, AllocationCounters, AllocationStats, Allocator, Reallocated};
use crate::error::AllocError;

/// A wrapper allocator that tracks memory usage statistics
///
/// Typically used as the bottom of an allocator chain in tests and
/// diagnostics: everything above it can be checked for leaks with
/// [`is_all_freed`](Self::is_all_freed).
///
/// # Thread Safety
/// Thread-safe if the underlying allocator is.
#[derive(Debug)]
pub struct TrackedAllocator<A> {
    inner: A,
    stats: AllocationCounters,
}

impl<A: Allocator> TrackedAllocator<A> {
    /// Creates a new `TrackedAllocator` wrapping the provided allocator
    pub fn new(allocator: A) -> Self {
        Self {
            inner: allocator,
            stats: AllocationCounters::new(),
        }
    }

    /// Gets a reference to the underlying allocator
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Returns the bytes currently outstanding
    pub fn allocated_bytes(&self) -> usize {
        self.stats.snapshot().current_bytes()
    }

    /// Get detailed statistics snapshot
    pub fn stats(&self) -> AllocationStats {
        self.stats.snapshot()
    }

    /// Every byte handed out has been returned
    pub fn is_all_freed(&self) -> bool {
        self.stats.is_all_freed()
    }

    const fn overhead() -> usize {
        SizeHeader::OVERHEAD
    }
}

// SAFETY: blocks come from the inner allocator with room for the header in
// front; the payload keeps the inner allocator's alignment because the
// header overhead is a multiple of DEFAULT_ALIGN.
unsafe impl<A: Allocator> Allocator for TrackedAllocator<A> {
    fn allocate(&self, size: usize) -> AllocResult<NonNull<u8>> {
        let total = size
            .checked_add(Self::overhead())
            .ok_or_else(|| AllocError::size_overflow("tracked allocation size"))?;
        let base = self.inner.allocate(total)?;

        self.stats.record_allocation(size);
        // SAFETY: `base` is fresh, aligned and at least `overhead()` bytes.
        Ok(unsafe { SizeHeader::install(base, SizeHeader { requested: size }) })
    }

    unsafe fn free(&self, ptr: *mut u8) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };

        // SAFETY: caller guarantees `ptr` came from `allocate` above.
        unsafe {
            let header = SizeHeader::read(ptr);
            self.stats.record_free(header.requested);
            self.inner.free(SizeHeader::base_of(ptr).as_ptr());
        }
    }

    unsafe fn try_realloc(
        &self,
        ptr: NonNull<u8>,
        min_size: usize,
        max_size: usize,
    ) -> Option<Reallocated> {
        let overhead = Self::overhead();
        let min_total = min_size.checked_add(overhead)?;
        let max_total = max_size.saturating_add(overhead);

        // SAFETY: caller guarantees `ptr` is live and ours.
        unsafe {
            let old = SizeHeader::read(ptr).requested;
            let base = SizeHeader::base_of(ptr);
            let resized = self.inner.try_realloc(base, min_total, max_total)?;

            let size = resized.size - overhead;
            if size >= old {
                self.stats.record_allocation(size - old);
            } else {
                self.stats.record_free(old - size);
            }

            Some(Reallocated {
                ptr: SizeHeader::install(resized.ptr, SizeHeader { requested: size }),
                size,
            })
        }
    }

    fn metadata_overhead(&self) -> usize {
        Self::overhead() + self.inner.metadata_overhead()
    }
}
