//! Page-bump arena allocator
//!
//! # Safety
//!
//! This module implements a single-flow arena on top of an inner allocator:
//! - Pages are drawn from the inner allocator and only the last one is ever
//!   bump-allocated into
//! - Every block starts with an [`ArenaHeader`] holding the owning arena's
//!   id, the requested size and the free-list link
//! - Freed blocks either retract the bump offset (when they sit at the top of
//!   the last page) or are pushed onto the free list for their exact
//!   allocation size
//!
//! ## Invariants
//!
//! - A block's allocation size is always `align_up(requested + OVERHEAD)`,
//!   so the header alone identifies which free list it belongs to
//! - A pointer is on at most one free list and never on a free list while
//!   live
//! - `page.offset <= page.size` and both are multiples of `DEFAULT_ALIGN`
//!
//! ## Single-flow contract
//!
//! State lives behind a mutex that is only ever acquired with `try_lock`.
//! Contention means two flows are driving the same arena at once, which is
//! a caller bug and panics.

use core::fmt;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use hashbrown::HashMap;
use parking_lot::{Mutex, MutexGuard};

use super::ArenaConfig;
use crate::allocator::header::{ArenaHeader, BlockHeader};
use crate::allocator::{
    AllocResult, AllocationTracker, Allocator, AllocatorRef, Reallocated, ScopedAllocator,
};
use crate::core::alignment::DEFAULT_ALIGN;
use crate::error::AllocError;
use crate::macros::{mem_error, mem_trace, mem_warn};
use crate::pool::{InstancePool, Poolable};
use crate::utils::{align_up, checked_padded_size};

static NEXT_ARENA_ID: AtomicU32 = AtomicU32::new(1);

/// Memory page owned by the arena
struct Page {
    base: NonNull<u8>,
    size: usize,
    offset: usize,
}

impl Page {
    #[inline]
    fn remaining(&self) -> usize {
        self.size - self.offset
    }

    #[inline]
    fn top(&self) -> NonNull<u8> {
        // SAFETY: offset <= size, so this is at most one past the end.
        unsafe { self.base.add(self.offset) }
    }

    #[inline]
    fn contains(&self, ptr: NonNull<u8>) -> bool {
        let start = self.base.as_ptr() as usize;
        (start..start + self.size).contains(&(ptr.as_ptr() as usize))
    }

    #[inline]
    fn offset_of(&self, ptr: NonNull<u8>) -> usize {
        ptr.as_ptr() as usize - self.base.as_ptr() as usize
    }
}

#[derive(Default)]
struct ArenaState {
    pages: Vec<Page>,
    /// Allocation size -> head of the free list (payload pointer)
    free_lists: HashMap<usize, NonNull<u8>>,
    self_allocated: usize,
    self_freed: usize,
    client_allocated: usize,
    client_freed: usize,
}

// SAFETY: the raw pointers refer to pages owned by this state; access is
// serialized by the arena's mutex.
unsafe impl Send for ArenaState {}

impl ArenaState {
    /// Pops a block of exactly `alloc_size` bytes off its free list
    fn pop_free(&mut self, alloc_size: usize) -> Option<NonNull<u8>> {
        let head = *self.free_lists.get(&alloc_size)?;
        // SAFETY: free-list entries are payloads with installed headers.
        let next = unsafe { ArenaHeader::read(head).next };
        match NonNull::new(next) {
            Some(next) => {
                self.free_lists.insert(alloc_size, next);
            }
            None => {
                self.free_lists.remove(&alloc_size);
            }
        }
        // SAFETY: `head` is a payload pointer.
        Some(unsafe { ArenaHeader::base_of(head) })
    }

    /// Retracts the bump offset if `base..base + alloc_size` is the top block
    fn try_bump_down(&mut self, base: NonNull<u8>, alloc_size: usize) -> bool {
        match self.pages.last_mut() {
            Some(page)
                if page.contains(base) && page.offset_of(base) + alloc_size == page.offset =>
            {
                page.offset -= alloc_size;
                true
            }
            _ => false,
        }
    }

    /// Releases every page; returns client bytes that were still outstanding
    fn release_all(&mut self, inner: &dyn Allocator) -> usize {
        self.free_lists.clear();
        for page in self.pages.drain(..) {
            // SAFETY: pages were obtained from `inner` and are released once.
            unsafe { inner.free(page.base.as_ptr()) };
            self.self_freed += page.size;
        }

        let outstanding = self.client_allocated - self.client_freed;
        self.client_freed = self.client_allocated;
        outstanding
    }

    fn free_list_blocks(&self) -> usize {
        self.free_lists
            .values()
            .map(|&head| {
                let mut count = 0;
                let mut cursor = head.as_ptr();
                while let Some(ptr) = NonNull::new(cursor) {
                    count += 1;
                    // SAFETY: free-list entries are payloads with headers.
                    cursor = unsafe { ArenaHeader::read(ptr).next };
                }
                count
            })
            .sum()
    }
}

/// Snapshot of an arena's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Pages currently held
    pub pages: usize,
    /// Bytes ever drawn from the inner allocator
    pub self_allocated: usize,
    /// Bytes ever returned to the inner allocator
    pub self_freed: usize,
    /// Client bytes ever handed out
    pub client_allocated: usize,
    /// Client bytes ever given back
    pub client_freed: usize,
    /// Blocks parked on free lists
    pub free_blocks: usize,
}

impl ArenaStats {
    /// Bytes currently held from the inner allocator
    pub fn page_bytes(&self) -> usize {
        self.self_allocated - self.self_freed
    }
}

/// Page-bump allocator with exact-size free lists
///
/// # Examples
///
/// ```
/// use scoped_alloc::allocator::{Allocator, NativeAllocator, ScopedAllocator};
/// use scoped_alloc::arena::ArenaAllocator;
///
/// let arena = ArenaAllocator::new(NativeAllocator::shared());
/// let ptr = arena.allocate(128).unwrap();
/// unsafe { ptr.as_ptr().write_bytes(0, 128) };
///
/// // Everything goes back to the native allocator at once
/// arena.free_all_allocations();
/// assert!(arena.is_all_freed());
/// ```
pub struct ArenaAllocator {
    id: u32,
    inner: AllocatorRef,
    config: ArenaConfig,
    tracker: Option<Arc<dyn AllocationTracker>>,
    owner: Weak<InstancePool<ArenaAllocator>>,
    state: Mutex<ArenaState>,
}

impl ArenaAllocator {
    /// Creates an arena with the default configuration
    pub fn new(inner: AllocatorRef) -> Self {
        Self::with_config(inner, ArenaConfig::default())
    }

    /// Creates an arena with a custom configuration
    ///
    /// The configuration is expected to be [validated](ArenaConfig::validate)
    /// by the caller.
    pub fn with_config(inner: AllocatorRef, config: ArenaConfig) -> Self {
        debug_assert!(config.validate().is_ok());
        Self {
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            inner,
            config,
            tracker: None,
            owner: Weak::new(),
            state: Mutex::new(ArenaState::default()),
        }
    }

    /// Forwards client traffic to `tracker`
    #[must_use = "builder methods must be chained or built"]
    pub fn with_tracker(mut self, tracker: Arc<dyn AllocationTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Instance pool this arena returns to on release
    #[must_use = "builder methods must be chained or built"]
    pub(crate) fn with_owner(mut self, owner: Weak<InstancePool<ArenaAllocator>>) -> Self {
        self.owner = owner;
        self
    }

    /// Unique id stamped into every block header
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Get a snapshot of the arena's counters
    pub fn stats(&self) -> ArenaStats {
        let state = self.lock();
        ArenaStats {
            pages: state.pages.len(),
            self_allocated: state.self_allocated,
            self_freed: state.self_freed,
            client_allocated: state.client_allocated,
            client_freed: state.client_freed,
            free_blocks: state.free_list_blocks(),
        }
    }

    /// Every page has been returned to the inner allocator
    pub fn is_all_freed(&self) -> bool {
        let state = self.lock();
        state.self_allocated == state.self_freed
    }

    /// Every client byte has been given back
    pub fn client_is_all_freed(&self) -> bool {
        let state = self.lock();
        state.client_allocated == state.client_freed
    }

    fn lock(&self) -> MutexGuard<'_, ArenaState> {
        self.state.try_lock().unwrap_or_else(|| {
            panic!(
                "arena {} is being used by two flows at once; arenas are single-flow",
                self.id
            )
        })
    }

    #[inline]
    fn check_owner(&self, header: &ArenaHeader) {
        assert_eq!(
            header.arena_id, self.id,
            "pointer belongs to arena {} but was passed to arena {}",
            header.arena_id, self.id
        );
    }

    #[inline]
    const fn alloc_size_of(requested: usize) -> usize {
        align_up(requested + ArenaHeader::OVERHEAD, DEFAULT_ALIGN)
    }

    fn page_size_for(&self, alloc_size: usize) -> AllocResult<usize> {
        if alloc_size <= self.config.page_size {
            return Ok(self.config.page_size);
        }
        alloc_size
            .checked_next_multiple_of(self.config.page_size)
            .ok_or_else(|| AllocError::size_overflow("arena page size"))
    }

    /// Carves `alloc_size` bytes off the last page, growing a page if needed
    fn bump(&self, state: &mut ArenaState, alloc_size: usize) -> AllocResult<NonNull<u8>> {
        if let Some(page) = state.pages.last_mut()
            && page.remaining() >= alloc_size
        {
            let base = page.top();
            page.offset += alloc_size;
            return Ok(base);
        }

        let page_size = self.page_size_for(alloc_size)?;
        let base = self.inner.allocate(page_size)?;
        if self.config.zero_pages {
            // SAFETY: fresh block of `page_size` bytes.
            unsafe { ptr::write_bytes(base.as_ptr(), 0, page_size) };
        }

        state.self_allocated += page_size;
        state.pages.push(Page {
            base,
            size: page_size,
            offset: alloc_size,
        });
        mem_trace!(
            arena = self.id,
            page_size,
            pages = state.pages.len(),
            "arena page allocated"
        );
        Ok(base)
    }

    fn report_freed(&self, outstanding: usize) {
        if outstanding > 0
            && let Some(tracker) = &self.tracker
        {
            tracker.client_free(outstanding);
        }
    }
}

// SAFETY: blocks are carved from pages aligned to DEFAULT_ALIGN in
// multiples of DEFAULT_ALIGN, and the header overhead is a multiple of
// DEFAULT_ALIGN, so every payload is aligned. Blocks never overlap because
// the bump offset only retracts over the top block and free-list blocks are
// reissued only for their exact size.
unsafe impl Allocator for ArenaAllocator {
    fn allocate(&self, size: usize) -> AllocResult<NonNull<u8>> {
        let alloc_size = checked_padded_size(
            size,
            ArenaHeader::OVERHEAD,
            DEFAULT_ALIGN,
            "arena allocation size",
        )?;

        let mut state = self.lock();
        let base = match state.pop_free(alloc_size) {
            Some(base) => base,
            None => self.bump(&mut state, alloc_size)?,
        };
        state.client_allocated += size;
        drop(state);

        if let Some(tracker) = &self.tracker {
            tracker.client_allocate(size);
        }

        // SAFETY: `base` is an aligned block of `alloc_size` bytes owned by
        // this arena and not handed out to anyone else.
        Ok(unsafe { ArenaHeader::install(base, ArenaHeader::live(self.id, size)) })
    }

    unsafe fn free(&self, ptr: *mut u8) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };

        let mut state = self.lock();
        // SAFETY: caller guarantees `ptr` is a live block from an arena; the
        // id check below catches blocks from other arenas.
        let header = unsafe { ArenaHeader::get_mut(ptr) };
        self.check_owner(header);

        let requested = header.requested;
        let alloc_size = Self::alloc_size_of(requested);
        // SAFETY: `ptr` is a payload pointer.
        let base = unsafe { ArenaHeader::base_of(ptr) };

        state.client_freed += requested;
        if !state.try_bump_down(base, alloc_size) {
            header.next = state
                .free_lists
                .insert(alloc_size, ptr)
                .map_or(ptr::null_mut(), NonNull::as_ptr);
        }
        drop(state);

        if let Some(tracker) = &self.tracker {
            tracker.client_free(requested);
        }
    }

    unsafe fn try_realloc(
        &self,
        ptr: NonNull<u8>,
        min_size: usize,
        max_size: usize,
    ) -> Option<Reallocated> {
        debug_assert!(min_size <= max_size);

        let mut state = self.lock();
        // SAFETY: caller guarantees `ptr` is a live block from an arena.
        let header = unsafe { ArenaHeader::get_mut(ptr) };
        self.check_owner(header);

        let old = header.requested;
        // SAFETY: `ptr` is a payload pointer.
        let base = unsafe { ArenaHeader::base_of(ptr) };

        let page = state.pages.last_mut()?;
        if !page.contains(base) {
            return None;
        }
        let block_offset = page.offset_of(base);
        if block_offset + Self::alloc_size_of(old) != page.offset {
            return None;
        }

        let capacity = page.size - block_offset - ArenaHeader::OVERHEAD;
        let size = max_size.min(capacity);
        if size < min_size {
            return None;
        }

        page.offset = block_offset + Self::alloc_size_of(size);
        header.requested = size;

        if size >= old {
            state.client_allocated += size - old;
        } else {
            state.client_freed += old - size;
        }
        drop(state);

        if let Some(tracker) = &self.tracker {
            if size >= old {
                tracker.client_allocate(size - old);
            } else {
                tracker.client_free(old - size);
            }
        }

        Some(Reallocated { ptr, size })
    }

    #[inline]
    fn metadata_overhead(&self) -> usize {
        ArenaHeader::OVERHEAD
    }
}

impl ScopedAllocator for ArenaAllocator {
    fn free_all_allocations(&self) {
        let outstanding = self.lock().release_all(&*self.inner);
        self.report_freed(outstanding);
    }

    fn release(self: Arc<Self>) {
        self.free_all_allocations();

        let owner = self.owner.clone();
        match Arc::into_inner(self) {
            Some(arena) => {
                if let Some(pool) = owner.upgrade() {
                    pool.put(arena);
                }
            }
            None => {
                mem_warn!("arena released while still shared; disposing instead of pooling");
            }
        }
    }
}

impl Poolable for ArenaAllocator {
    fn reset(&mut self) {
        let outstanding = self.state.get_mut().release_all(&*self.inner);
        self.report_freed(outstanding);
    }
}

impl fmt::Debug for ArenaAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaAllocator")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("tracked", &self.tracker.is_some())
            .finish_non_exhaustive()
    }
}

impl Drop for ArenaAllocator {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let outstanding = state.client_allocated - state.client_freed;

        if outstanding > 0 {
            mem_error!(
                arena = self.id,
                outstanding,
                pages = state.pages.len(),
                "arena dropped with outstanding allocations"
            );
            debug_assert!(
                std::thread::panicking(),
                "arena {} dropped with {outstanding} outstanding client bytes",
                self.id
            );
        }

        let outstanding = state.release_all(&*self.inner);
        self.report_freed(outstanding);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{AllocationCounters, NativeAllocator, TrackedAllocator};

    fn arena(page_size: usize) -> ArenaAllocator {
        ArenaAllocator::with_config(
            NativeAllocator::shared(),
            ArenaConfig::new(page_size).with_zero_pages(false),
        )
    }

    #[test]
    fn test_alignment_and_overhead() {
        let arena = arena(4096);
        for size in [0, 1, 7, 16, 33, 100] {
            let ptr = arena.allocate(size).unwrap();
            assert_eq!(ptr.as_ptr() as usize % DEFAULT_ALIGN, 0);
        }
        assert_eq!(arena.metadata_overhead(), ArenaHeader::OVERHEAD);
        arena.free_all_allocations();
    }

    #[test]
    fn test_top_free_bumps_down() {
        let arena = arena(4096);
        let a = arena.allocate(64).unwrap();
        let b = arena.allocate(100).unwrap();
        unsafe { arena.free(b.as_ptr()) };

        // Reuses the same offset, no free-list entry, no new page
        let c = arena.allocate(90).unwrap();
        assert_eq!(b, c);
        let stats = arena.stats();
        assert_eq!(stats.pages, 1);
        assert_eq!(stats.free_blocks, 0);

        unsafe {
            arena.free(c.as_ptr());
            arena.free(a.as_ptr());
        }
        assert!(arena.client_is_all_freed());
        arena.free_all_allocations();
    }

    #[test]
    fn test_free_list_exact_size() {
        let arena = arena(4096);
        let a = arena.allocate(48).unwrap();
        let _b = arena.allocate(48).unwrap();
        unsafe { arena.free(a.as_ptr()) };
        assert_eq!(arena.stats().free_blocks, 1);

        // Different rounded size does not take the free block
        let other = arena.allocate(500).unwrap();
        assert_ne!(other, a);
        assert_eq!(arena.stats().free_blocks, 1);

        let again = arena.allocate(48).unwrap();
        assert_eq!(again, a);
        assert_eq!(arena.stats().free_blocks, 0);
        arena.free_all_allocations();
    }

    #[test]
    fn test_large_request_gets_own_page() {
        let arena = arena(1024);
        let _small = arena.allocate(16).unwrap();
        let _big = arena.allocate(5000).unwrap();

        let stats = arena.stats();
        assert_eq!(stats.pages, 2);
        assert_eq!(stats.page_bytes(), 1024 + 5120);
        arena.free_all_allocations();
    }

    #[test]
    fn test_try_realloc_top_only() {
        let arena = arena(4096);
        let a = arena.allocate(100).unwrap();
        let b = arena.allocate(100).unwrap();

        unsafe {
            // `a` is not at the top
            assert!(arena.try_realloc(a, 200, 200).is_none());

            let grown = arena.try_realloc(b, 200, 1000).unwrap();
            assert_eq!(grown.ptr, b);
            assert_eq!(grown.size, 1000);

            // Bounded by the page's remaining capacity
            let max = arena.try_realloc(b, 1, usize::MAX).unwrap();
            let header = ArenaHeader::OVERHEAD;
            let a_size = ArenaAllocator::alloc_size_of(100);
            assert_eq!(max.size, 4096 - a_size - header);

            assert!(arena.try_realloc(b, 8000, 9000).is_none());

            let shrunk = arena.try_realloc(b, 10, 10).unwrap();
            assert_eq!(shrunk.size, 10);
        }

        let stats = arena.stats();
        assert_eq!(stats.client_allocated - stats.client_freed, 110);
        arena.free_all_allocations();
    }

    #[test]
    fn test_free_null_is_noop() {
        let arena = arena(4096);
        unsafe { arena.free(ptr::null_mut()) };
        assert!(arena.is_all_freed());
    }

    #[test]
    #[should_panic(expected = "was passed to arena")]
    fn test_foreign_pointer_panics() {
        let a = arena(4096);
        let b = arena(4096);
        let ptr = a.allocate(32).unwrap();
        unsafe { b.free(ptr.as_ptr()) };
    }

    #[test]
    fn test_free_all_reports_to_tracker() {
        let backing = Arc::new(TrackedAllocator::new(NativeAllocator::new()));
        let counters = Arc::new(AllocationCounters::new());
        let arena = ArenaAllocator::with_config(backing.clone(), ArenaConfig::new(1024))
            .with_tracker(counters.clone());

        for size in [10, 200, 3000] {
            arena.allocate(size).unwrap();
        }
        assert_eq!(counters.snapshot().total_allocated, 3210);
        assert!(!backing.is_all_freed());

        arena.free_all_allocations();
        assert!(counters.is_all_freed());
        assert!(backing.is_all_freed());
        assert!(arena.is_all_freed());
        assert!(arena.client_is_all_freed());
    }

    #[test]
    fn test_release_returns_to_owner() {
        let pool = Arc::new_cyclic(|weak: &Weak<InstancePool<ArenaAllocator>>| {
            let weak = weak.clone();
            InstancePool::new(move || {
                ArenaAllocator::new(NativeAllocator::shared()).with_owner(weak.clone())
            })
        });

        let arena = Arc::new(pool.get());
        arena.allocate(64).unwrap();
        arena.release();
        assert_eq!(pool.idle_len(), 1);

        // Still shared: disposed, not pooled
        let arena = Arc::new(pool.get());
        let other = Arc::clone(&arena);
        arena.release();
        assert_eq!(pool.idle_len(), 0);
        drop(other);
    }
}
