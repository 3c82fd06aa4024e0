//! Native allocator implementation
//!
//! Thin wrapper over the platform's `malloc`/`realloc`/`free`. It is the leaf
//! every other allocator in this crate eventually draws from.

use core::ptr::NonNull;
use std::sync::{Arc, OnceLock};

use super::{AllocResult, Allocator, AllocatorRef, Reallocated};
use crate::error::AllocError;

/// Wrapper for the platform allocator
///
/// Stateless, so every instance is interchangeable. Pointers are aligned to
/// [`DEFAULT_ALIGN`](crate::core::alignment::DEFAULT_ALIGN), which is what
/// `malloc` guarantees on every supported platform.
///
/// # Thread Safety
/// `malloc` and `free` are thread-safe.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeAllocator;

static SHARED: OnceLock<AllocatorRef> = OnceLock::new();

impl NativeAllocator {
    /// Creates a new `NativeAllocator`
    #[inline]
    pub const fn new() -> Self {
        NativeAllocator
    }

    /// Process-wide shared instance
    pub fn shared() -> AllocatorRef {
        Arc::clone(SHARED.get_or_init(|| Arc::new(NativeAllocator)))
    }
}

// SAFETY: malloc returns unique, suitably aligned blocks; zero-size requests
// are bumped to one byte so every pointer is distinct.
unsafe impl Allocator for NativeAllocator {
    #[inline]
    fn allocate(&self, size: usize) -> AllocResult<NonNull<u8>> {
        // SAFETY: malloc has no preconditions.
        let ptr = unsafe { libc::malloc(size.max(1)) };
        NonNull::new(ptr.cast::<u8>()).ok_or_else(|| AllocError::allocation_failed(size))
    }

    #[inline]
    unsafe fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        // SAFETY: caller guarantees `ptr` came from this allocator (malloc).
        unsafe { libc::free(ptr.cast()) }
    }

    unsafe fn try_realloc(
        &self,
        ptr: NonNull<u8>,
        min_size: usize,
        max_size: usize,
    ) -> Option<Reallocated> {
        debug_assert!(min_size <= max_size);
        // SAFETY: caller guarantees `ptr` came from malloc and is live. On
        // failure realloc leaves the old block untouched.
        let new_ptr = unsafe { libc::realloc(ptr.as_ptr().cast(), min_size.max(1)) };
        NonNull::new(new_ptr.cast::<u8>()).map(|ptr| Reallocated {
            ptr,
            size: min_size,
        })
    }

    #[inline]
    fn metadata_overhead(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alignment::DEFAULT_ALIGN;

    #[test]
    fn test_allocate_and_free() {
        let allocator = NativeAllocator::new();
        let ptr = allocator.allocate(100).unwrap();
        assert_eq!(ptr.as_ptr() as usize % DEFAULT_ALIGN, 0);

        unsafe {
            ptr.as_ptr().write_bytes(0xAB, 100);
            assert_eq!(*ptr.as_ptr().add(99), 0xAB);
            allocator.free(ptr.as_ptr());
        }
    }

    #[test]
    fn test_zero_size_is_unique() {
        let allocator = NativeAllocator::new();
        let a = allocator.allocate(0).unwrap();
        let b = allocator.allocate(0).unwrap();
        assert_ne!(a, b);
        unsafe {
            allocator.free(a.as_ptr());
            allocator.free(b.as_ptr());
        }
    }

    #[test]
    fn test_free_null_is_noop() {
        unsafe { NativeAllocator::new().free(core::ptr::null_mut()) };
    }

    #[test]
    fn test_realloc_preserves_contents() {
        let allocator = NativeAllocator::shared();
        let ptr = allocator.allocate(16).unwrap();
        unsafe {
            ptr.as_ptr().write_bytes(7, 16);
            let grown = allocator.try_realloc(ptr, 4096, 4096).unwrap();
            assert_eq!(grown.size, 4096);
            assert_eq!(*grown.ptr.as_ptr().add(15), 7);
            allocator.free(grown.ptr.as_ptr());
        }
        assert_eq!(allocator.metadata_overhead(), 0);
    }
}
