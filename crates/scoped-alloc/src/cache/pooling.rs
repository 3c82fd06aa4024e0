//! Allocation pooling cache
//!
//! Recycles freed blocks by size class instead of returning them to the
//! inner allocator, and evicts them again once they have been idle longer
//! than their size class's adaptive TTL.
//!
//! # Safety
//!
//! - Every block carries a [`CacheHeader`] with the client's requested size
//!   and the size class the block was carved for
//! - Cached blocks are owned by their bucket until reissued or evicted and
//!   are never reachable by a client while cached
//! - All state, including the inner allocator calls, is serialized by one
//!   mutex per cache instance
//!
//! ## Bookkeeping
//!
//! A bucket's blocks sit in a deque ordered oldest to newest. Its runs in
//! the global LRU list partition that deque in the same order, so evicting
//! the bucket's oldest run always means draining from the front, while LIFO
//! reuse pops from the back and shrinks the newest run.

use core::fmt;
use core::ptr::NonNull;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use parking_lot::Mutex;

use super::PoolingCacheConfig;
use super::lru::{LruList, NodeId};
use super::size_class;
use super::ttl::AdaptiveTtl;
use crate::allocator::header::{BlockHeader, CacheHeader};
use crate::allocator::{AllocResult, Allocator, AllocatorRef, Reallocated};
use crate::macros::{mem_debug, mem_error, mem_warn};

/// Recycled blocks of one size class
struct Bucket {
    /// Cached blocks (bases), oldest first
    blocks: VecDeque<NonNull<u8>>,
    /// This bucket's LRU runs, oldest first
    runs: VecDeque<NodeId>,
    ttl: AdaptiveTtl,
}

impl Bucket {
    fn new(config: &PoolingCacheConfig) -> Self {
        Self {
            blocks: VecDeque::new(),
            runs: VecDeque::new(),
            ttl: AdaptiveTtl::new(config.initial_ttl, config.window_len),
        }
    }
}

struct CacheState {
    buckets: HashMap<usize, Bucket>,
    lru: LruList,
    cached_bytes: usize,
    cleanup_threshold: usize,
    prune_failures: u32,

    hits: u64,
    misses: u64,
    evictions: u64,
    self_allocated: usize,
    self_freed: usize,
    client_allocated: usize,
    client_freed: usize,
}

// SAFETY: the raw pointers are blocks owned by the cache; access is
// serialized by the cache mutex.
unsafe impl Send for CacheState {}

impl CacheState {
    fn new(cleanup_threshold: usize) -> Self {
        Self {
            buckets: HashMap::new(),
            lru: LruList::new(),
            cached_bytes: 0,
            cleanup_threshold,
            prune_failures: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            self_allocated: 0,
            self_freed: 0,
            client_allocated: 0,
            client_freed: 0,
        }
    }

    /// Returns every cached block to `inner`; returns the bytes released
    fn release_cached(&mut self, inner: &dyn Allocator) -> usize {
        let mut released = 0;
        for (&class, bucket) in &mut self.buckets {
            for base in bucket.blocks.drain(..) {
                // SAFETY: cached blocks came from `inner`.
                unsafe { inner.free(base.as_ptr()) };
                released += class;
            }
            bucket.runs.clear();
        }
        self.lru.clear();
        self.cached_bytes = 0;
        self.self_freed += released;
        released
    }
}

/// Snapshot of a pooling cache's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Allocations served from a bucket
    pub hits: u64,
    /// Allocations that went to the inner allocator
    pub misses: u64,
    /// Cached blocks released by pruning
    pub evictions: u64,
    /// Bytes currently parked in buckets
    pub cached_bytes: usize,
    /// Blocks currently parked in buckets
    pub cached_blocks: usize,
    /// Size classes seen so far
    pub buckets: usize,
    /// Cached-byte level that triggers pruning on free
    pub cleanup_threshold: usize,
    /// Bytes ever drawn from the inner allocator
    pub self_allocated: usize,
    /// Bytes ever returned to the inner allocator
    pub self_freed: usize,
    /// Client bytes ever handed out
    pub client_allocated: usize,
    /// Client bytes ever given back
    pub client_freed: usize,
}

impl CacheStats {
    /// Fraction of allocations served from the cache
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pooling Cache Statistics:")?;
        writeln!(f, "  Hits: {} ({:.2}%)", self.hits, self.hit_ratio() * 100.0)?;
        writeln!(f, "  Misses: {}", self.misses)?;
        writeln!(f, "  Evictions: {}", self.evictions)?;
        writeln!(
            f,
            "  Cached: {} bytes in {} blocks over {} size classes",
            self.cached_bytes, self.cached_blocks, self.buckets
        )?;
        write!(f, "  Cleanup threshold: {} bytes", self.cleanup_threshold)
    }
}

/// Size-classed recycling allocator with adaptive eviction
///
/// Usable directly as an allocator or as the page source for arenas.
/// Safe to share between flows: every operation takes the cache lock.
///
/// # Examples
///
/// ```
/// use scoped_alloc::allocator::{Allocator, NativeAllocator};
/// use scoped_alloc::cache::AllocationPoolingCache;
///
/// let cache = AllocationPoolingCache::new(NativeAllocator::shared());
///
/// let a = cache.allocate(100).unwrap();
/// unsafe { cache.free(a.as_ptr()) };
///
/// // Same size class: the freed block comes straight back
/// let b = cache.allocate(100).unwrap();
/// assert_eq!(a, b);
/// assert_eq!(cache.stats().hits, 1);
/// # unsafe { cache.free(b.as_ptr()) };
/// ```
pub struct AllocationPoolingCache {
    inner: AllocatorRef,
    config: PoolingCacheConfig,
    state: Mutex<CacheState>,
}

impl AllocationPoolingCache {
    /// Creates a cache with the default configuration
    pub fn new(inner: AllocatorRef) -> Self {
        Self::with_config(inner, PoolingCacheConfig::default())
    }

    /// Creates a cache with a custom configuration
    ///
    /// The configuration is expected to be
    /// [validated](PoolingCacheConfig::validate) by the caller.
    pub fn with_config(inner: AllocatorRef, config: PoolingCacheConfig) -> Self {
        debug_assert!(config.validate().is_ok());
        let state = CacheState::new(config.cleanup_threshold);

        Self {
            inner,
            config,
            state: Mutex::new(state),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &PoolingCacheConfig {
        &self.config
    }

    /// Allocation size (header included) used for a request of `size` bytes
    pub fn size_class(&self, size: usize) -> AllocResult<usize> {
        size_class::class_for(size, CacheHeader::OVERHEAD)
    }

    /// Current TTL of the size class serving `size`, if it exists yet
    pub fn ttl_for(&self, size: usize) -> Option<Duration> {
        let class = self.size_class(size).ok()?;
        self.state
            .lock()
            .buckets
            .get(&class)
            .map(|bucket| bucket.ttl.ttl())
    }

    /// Seeds the TTL of the size class serving `size`
    pub fn set_ttl_for(&self, size: usize, ttl: Duration) -> AllocResult<()> {
        let class = self.size_class(size)?;
        let mut state = self.state.lock();
        state
            .buckets
            .entry(class)
            .or_insert_with(|| Bucket::new(&self.config))
            .ttl
            .set_ttl(ttl);
        Ok(())
    }

    /// Evicts cached blocks whose idle time exceeds their size class's TTL
    ///
    /// With `threshold` set, stops as soon as cached bytes are at or below
    /// it. Returns the number of bytes released.
    pub fn prune(&self, threshold: Option<usize>) -> usize {
        let mut state = self.state.lock();
        let before = state.cached_bytes;
        self.prune_locked(&mut state, threshold, 0);
        before - state.cached_bytes
    }

    /// Returns every cached block to the inner allocator
    ///
    /// TTL state per size class is kept. Returns the number of bytes released.
    pub fn clear_cached_memory(&self) -> usize {
        let released = self.state.lock().release_cached(&*self.inner);
        mem_debug!(released, "pooling cache cleared");
        released
    }

    /// Get a snapshot of the cache's counters
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            cached_bytes: state.cached_bytes,
            cached_blocks: state.buckets.values().map(|b| b.blocks.len()).sum(),
            buckets: state.buckets.len(),
            cleanup_threshold: state.cleanup_threshold,
            self_allocated: state.self_allocated,
            self_freed: state.self_freed,
            client_allocated: state.client_allocated,
            client_freed: state.client_freed,
        }
    }

    /// Every byte drawn from the inner allocator has been returned
    pub fn is_all_freed(&self) -> bool {
        let state = self.state.lock();
        state.self_allocated == state.self_freed
    }

    /// Every client byte has been given back
    pub fn client_is_all_freed(&self) -> bool {
        let state = self.state.lock();
        state.client_allocated == state.client_freed
    }

    /// Pops the most recently cached block of `class`
    fn take_cached(state: &mut CacheState, class: usize) -> Option<NonNull<u8>> {
        let bucket = state.buckets.get_mut(&class)?;
        let base = bucket.blocks.pop_back()?;

        if let Some(&newest) = bucket.runs.back()
            && let Some(node) = state.lru.get_mut(newest)
        {
            node.count -= 1;
            if node.count == 0 {
                state.lru.remove(newest);
                bucket.runs.pop_back();
            }
        }

        state.cached_bytes -= class;
        Some(base)
    }

    /// Parks a block in its bucket and at the head of the LRU list
    fn cache_block(&self, state: &mut CacheState, base: NonNull<u8>, class: usize, now: Instant) {
        let head = state.lru.head();
        let bucket = state
            .buckets
            .entry(class)
            .or_insert_with(|| Bucket::new(&self.config));
        bucket.blocks.push_back(base);

        match bucket.runs.back() {
            Some(&newest) if head == Some(newest) => {
                if let Some(node) = state.lru.get_mut(newest) {
                    node.count += 1;
                    node.cached_at = now;
                }
            }
            _ => {
                let id = state.lru.push_front(class, now);
                bucket.runs.push_back(id);
            }
        }

        state.cached_bytes += class;
    }

    /// Walks the LRU list from the tail, expiring runs past their TTL
    fn prune_locked(&self, state: &mut CacheState, threshold: Option<usize>, incoming: usize) {
        let now = Instant::now();
        let mut cursor = state.lru.tail();

        while let Some(id) = cursor {
            if let Some(threshold) = threshold
                && state.cached_bytes + incoming <= threshold
            {
                break;
            }
            cursor = state.lru.prev(id);

            let Some(node) = state.lru.get(id) else {
                break;
            };
            let (class, count, cached_at) = (node.size_class, node.count, node.cached_at);
            let Some(bucket) = state.buckets.get_mut(&class) else {
                continue;
            };
            if now.saturating_duration_since(cached_at) <= bucket.ttl.ttl() {
                continue;
            }

            debug_assert_eq!(bucket.runs.front(), Some(&id));
            bucket.runs.pop_front();
            state.lru.remove(id);

            for base in bucket.blocks.drain(..count) {
                // SAFETY: cached blocks came from `inner` and are owned by
                // the bucket until released here.
                unsafe { self.inner.free(base.as_ptr()) };
            }
            for _ in 0..count {
                bucket
                    .ttl
                    .observe(true, self.config.ttl_step, self.config.max_ttl);
            }

            let released = class * count;
            state.cached_bytes -= released;
            state.self_freed += released;
            state.evictions += count as u64;
        }
    }

    /// Prune pass run by `free` before caching `incoming` bytes
    fn relieve_pressure(&self, state: &mut CacheState, incoming: usize) {
        let threshold = state.cleanup_threshold;
        self.prune_locked(state, Some(threshold), incoming);

        if state.cached_bytes + incoming <= threshold {
            state.prune_failures = 0;
            return;
        }

        state.prune_failures += 1;
        if state.prune_failures >= self.config.max_prune_failures {
            state.cleanup_threshold = state.cached_bytes + incoming;
            state.prune_failures = 0;
            mem_warn!(
                old = threshold,
                new = state.cleanup_threshold,
                "sustained cache pressure; raising cleanup threshold"
            );
        }
    }
}

// SAFETY: blocks come from the inner allocator (DEFAULT_ALIGN-aligned) and
// the header overhead is a multiple of DEFAULT_ALIGN. A block is either
// cached or live, never both.
unsafe impl Allocator for AllocationPoolingCache {
    fn allocate(&self, size: usize) -> AllocResult<NonNull<u8>> {
        let class = self.size_class(size)?;
        let mut state = self.state.lock();

        let cached = if class <= self.config.max_item_size {
            Self::take_cached(&mut state, class)
        } else {
            None
        };

        let base = match cached {
            Some(base) => {
                state.hits += 1;
                if let Some(bucket) = state.buckets.get_mut(&class) {
                    bucket
                        .ttl
                        .observe(false, self.config.ttl_step, self.config.max_ttl);
                }
                base
            }
            None => {
                let base = self.inner.allocate(class)?;
                state.misses += 1;
                state.self_allocated += class;
                base
            }
        };
        state.client_allocated += size;

        // SAFETY: `base` is an aligned block of `class` bytes owned by us.
        Ok(unsafe {
            CacheHeader::install(
                base,
                CacheHeader {
                    requested: size,
                    alloc_size: class,
                },
            )
        })
    }

    unsafe fn free(&self, ptr: *mut u8) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };

        // SAFETY: caller guarantees `ptr` came from this cache.
        let (header, base) = unsafe { (CacheHeader::read(ptr), CacheHeader::base_of(ptr)) };
        let class = header.alloc_size;

        let mut state = self.state.lock();
        state.client_freed += header.requested;

        if class > self.config.max_item_size {
            // SAFETY: block came from `inner` and is no longer used.
            unsafe { self.inner.free(base.as_ptr()) };
            state.self_freed += class;
            return;
        }

        if state.cached_bytes + class > state.cleanup_threshold {
            self.relieve_pressure(&mut state, class);
        }
        self.cache_block(&mut state, base, class, Instant::now());
    }

    unsafe fn try_realloc(
        &self,
        ptr: NonNull<u8>,
        min_size: usize,
        max_size: usize,
    ) -> Option<Reallocated> {
        debug_assert!(min_size <= max_size);

        let mut state = self.state.lock();
        // SAFETY: caller guarantees `ptr` is live and ours; the lock
        // serializes header access.
        let header = unsafe { CacheHeader::get_mut(ptr) };
        let capacity = header.alloc_size - CacheHeader::OVERHEAD;
        if min_size > capacity {
            return None;
        }

        let old = header.requested;
        let size = max_size.min(capacity);
        header.requested = size;
        if size >= old {
            state.client_allocated += size - old;
        } else {
            state.client_freed += old - size;
        }

        Some(Reallocated { ptr, size })
    }

    #[inline]
    fn metadata_overhead(&self) -> usize {
        CacheHeader::OVERHEAD
    }
}

impl fmt::Debug for AllocationPoolingCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocationPoolingCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Drop for AllocationPoolingCache {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        state.release_cached(&*self.inner);

        let outstanding = state.client_allocated - state.client_freed;
        if outstanding > 0 {
            mem_error!(
                outstanding,
                "pooling cache dropped with outstanding client allocations"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::allocator::{NativeAllocator, TrackedAllocator};

    fn tracked() -> Arc<TrackedAllocator<NativeAllocator>> {
        Arc::new(TrackedAllocator::new(NativeAllocator::new()))
    }

    #[test]
    fn test_lifo_reuse() {
        let cache = AllocationPoolingCache::new(NativeAllocator::shared());
        let a = cache.allocate(64).unwrap();
        let b = cache.allocate(64).unwrap();
        unsafe {
            cache.free(a.as_ptr());
            cache.free(b.as_ptr());
        }

        // most recently freed first
        assert_eq!(cache.allocate(60).unwrap(), b);
        assert_eq!(cache.allocate(64).unwrap(), a);

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.cached_blocks, 0);
        unsafe {
            cache.free(a.as_ptr());
            cache.free(b.as_ptr());
        }
        assert_eq!(cache.clear_cached_memory(), 2 * cache.size_class(64).unwrap());
        assert_eq!(cache.clear_cached_memory(), 0);
    }

    #[test]
    fn test_runs_coalesce() {
        let cache = AllocationPoolingCache::new(NativeAllocator::shared());
        let ptrs: Vec<_> = (0..4).map(|_| cache.allocate(32).unwrap()).collect();
        for ptr in &ptrs {
            unsafe { cache.free(ptr.as_ptr()) };
        }
        assert_eq!(cache.state.lock().lru.len(), 1);

        let other = cache.allocate(4000).unwrap();
        unsafe { cache.free(other.as_ptr()) };
        let extra = cache.allocate(32).unwrap();
        unsafe { cache.free(extra.as_ptr()) };
        // 32-byte run, 4000-byte run, new 32-byte run
        assert_eq!(cache.state.lock().lru.len(), 3);
        cache.clear_cached_memory();
    }

    #[test]
    fn test_oversized_items_bypass_cache() {
        let backing = tracked();
        let config = PoolingCacheConfig::default().with_max_item_size(1024);
        let cache = AllocationPoolingCache::with_config(backing.clone(), config);

        let big = cache.allocate(4096).unwrap();
        unsafe { cache.free(big.as_ptr()) };
        assert_eq!(cache.stats().cached_blocks, 0);
        assert!(backing.is_all_freed());
    }

    #[test]
    fn test_realloc_within_class() {
        let cache = AllocationPoolingCache::new(NativeAllocator::shared());
        let ptr = cache.allocate(1000).unwrap();
        let class = cache.size_class(1000).unwrap();
        let capacity = class - CacheHeader::OVERHEAD;

        unsafe {
            let grown = cache.try_realloc(ptr, 1001, usize::MAX).unwrap();
            assert_eq!(grown.ptr, ptr);
            assert_eq!(grown.size, capacity);
            assert!(cache.try_realloc(ptr, capacity + 1, capacity + 10).is_none());

            let shrunk = cache.try_realloc(ptr, 10, 10).unwrap();
            assert_eq!(shrunk.size, 10);
            cache.free(ptr.as_ptr());
        }
        assert!(cache.client_is_all_freed());
    }

    #[test]
    fn test_prune_expires_by_ttl() {
        let backing = tracked();
        let cache = AllocationPoolingCache::with_config(
            backing.clone(),
            PoolingCacheConfig::default().with_initial_ttl(Duration::ZERO),
        );

        let ptr = cache.allocate(128).unwrap();
        unsafe { cache.free(ptr.as_ptr()) };
        thread::sleep(Duration::from_millis(2));

        assert_eq!(cache.prune(None), cache.size_class(128).unwrap());
        assert_eq!(cache.stats().evictions, 1);
        assert!(backing.is_all_freed());
    }

    #[test]
    fn test_threshold_raised_under_sustained_pressure() {
        let config = PoolingCacheConfig::default()
            .with_cleanup_threshold(256)
            .with_max_prune_failures(2);
        let cache = AllocationPoolingCache::with_config(NativeAllocator::shared(), config);

        let ptrs: Vec<_> = (0..16).map(|_| cache.allocate(48).unwrap()).collect();
        for ptr in &ptrs {
            unsafe { cache.free(ptr.as_ptr()) };
        }

        // Nothing is old enough to expire, so the threshold had to move
        let stats = cache.stats();
        assert_eq!(stats.cached_blocks, 16);
        assert!(stats.cleanup_threshold > 256);
        assert_eq!(stats.evictions, 0);
        cache.clear_cached_memory();
    }

    #[test]
    fn test_concurrent_use() {
        let backing = tracked();
        let cache = Arc::new(AllocationPoolingCache::new(backing.clone()));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..200 {
                        let ptr = cache.allocate(16 + (i + t) % 300).unwrap();
                        unsafe { cache.free(ptr.as_ptr()) };
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.client_is_all_freed());
        cache.clear_cached_memory();
        assert!(cache.is_all_freed());
        assert!(backing.is_all_freed());
    }
}
