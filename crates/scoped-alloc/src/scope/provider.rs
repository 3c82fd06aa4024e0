//! Allocator providers
//!
//! A provider is what gets registered with the scope manager under a
//! [`ProviderId`](super::ProviderId). Scoped providers hand out a fresh
//! [`ScopedAllocator`] per scope; unscoped providers expose one shared
//! allocator for every flow.

use core::fmt;
use std::sync::Arc;

use crate::allocator::{
    AllocationCounters, AllocationStats, AllocatorRef, NativeAllocator, ScopedAllocator,
};
use crate::arena::{ArenaAllocator, ArenaConfig};
use crate::cache::{AllocationPoolingCache, PoolingCacheConfig};
use crate::error::{MemoryError, MemoryResult};
use crate::macros::mem_debug;
use crate::pool::{InstancePool, InstancePoolConfig};

/// Source of allocators for one provider id
pub trait AllocatorProvider: Send + Sync {
    /// Allocator for a newly opened scope
    ///
    /// Only called for providers registered as scoped.
    fn create_scoped(&self) -> MemoryResult<Arc<dyn ScopedAllocator>> {
        Err(MemoryError::not_supported("scoped allocators"))
    }

    /// Allocator shared by every flow
    ///
    /// Only called for providers registered as unscoped.
    fn shared(&self) -> Option<AllocatorRef> {
        None
    }

    /// Drop whatever memory the provider keeps cached
    fn clear_cache(&self) {}

    /// Called once when the manager forgets the provider
    fn dispose(&self) {}
}

/// Unscoped provider over the platform allocator
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeProvider;

impl AllocatorProvider for NativeProvider {
    fn shared(&self) -> Option<AllocatorRef> {
        Some(NativeAllocator::shared())
    }
}

/// Unscoped provider exposing a shared [`AllocationPoolingCache`]
#[derive(Debug)]
pub struct CachingProvider {
    cache: Arc<AllocationPoolingCache>,
}

impl CachingProvider {
    /// Caching provider over the native allocator
    pub fn new(config: PoolingCacheConfig) -> MemoryResult<Self> {
        config.validate()?;
        Ok(Self::from_cache(Arc::new(AllocationPoolingCache::with_config(
            NativeAllocator::shared(),
            config,
        ))))
    }

    /// Wraps an existing cache
    pub fn from_cache(cache: Arc<AllocationPoolingCache>) -> Self {
        Self { cache }
    }

    /// The wrapped cache
    pub fn cache(&self) -> &Arc<AllocationPoolingCache> {
        &self.cache
    }
}

impl AllocatorProvider for CachingProvider {
    fn shared(&self) -> Option<AllocatorRef> {
        Some(self.cache.clone())
    }

    fn clear_cache(&self) {
        self.cache.clear_cached_memory();
    }

    fn dispose(&self) {
        self.cache.clear_cached_memory();
    }
}

/// Scoped provider handing out pooled arenas
///
/// Arenas come from an [`InstancePool`] and return to it when their scope
/// ends. All arenas report client traffic to one set of counters, so the
/// provider can tell whether everything its scopes allocated was freed.
pub struct ArenaProvider {
    pool: Arc<InstancePool<ArenaAllocator>>,
    counters: Arc<AllocationCounters>,
    cache: Option<Arc<AllocationPoolingCache>>,
}

impl ArenaProvider {
    /// Arenas drawing pages straight from the native allocator
    pub fn new(arena_config: ArenaConfig) -> MemoryResult<Self> {
        Self::with_page_source(
            NativeAllocator::shared(),
            arena_config,
            InstancePoolConfig::default(),
        )
    }

    /// Arenas drawing pages from a pooling cache owned by the provider
    ///
    /// Pages released by one scope are reused by the next instead of going
    /// back to the platform allocator.
    pub fn with_pooling_cache(
        arena_config: ArenaConfig,
        cache_config: PoolingCacheConfig,
    ) -> MemoryResult<Self> {
        cache_config.validate()?;
        let cache = Arc::new(AllocationPoolingCache::with_config(
            NativeAllocator::shared(),
            cache_config,
        ));

        let mut provider = Self::with_page_source(
            cache.clone(),
            arena_config,
            InstancePoolConfig::default(),
        )?;
        provider.cache = Some(cache);
        Ok(provider)
    }

    /// Arenas drawing pages from an arbitrary allocator
    pub fn with_page_source(
        page_source: AllocatorRef,
        arena_config: ArenaConfig,
        pool_config: InstancePoolConfig,
    ) -> MemoryResult<Self> {
        arena_config.validate()?;
        pool_config.validate()?;

        let counters = Arc::new(AllocationCounters::new());
        let tracker = counters.clone();
        let pool = Arc::new_cyclic(|owner| {
            let owner = owner.clone();
            InstancePool::with_config(pool_config, move || {
                ArenaAllocator::with_config(page_source.clone(), arena_config.clone())
                    .with_owner(owner.clone())
                    .with_tracker(tracker.clone())
            })
        });

        Ok(Self {
            pool,
            counters,
            cache: None,
        })
    }

    /// Client traffic across every arena this provider handed out
    pub fn client_stats(&self) -> AllocationStats {
        self.counters.snapshot()
    }

    /// Every client byte allocated in this provider's scopes was freed
    pub fn client_is_all_freed(&self) -> bool {
        self.counters.is_all_freed()
    }

    /// No client bytes outstanding and no idle arena holds pages
    ///
    /// Pages parked in the provider's pooling cache do not count; they are
    /// cached memory, not allocations.
    pub fn is_all_freed(&self) -> bool {
        let mut idle_clean = true;
        self.pool.for_each_idle(|arena| idle_clean &= arena.is_all_freed());
        idle_clean && self.counters.is_all_freed()
    }

    /// Arenas waiting in the pool
    pub fn idle_arenas(&self) -> usize {
        self.pool.idle_len()
    }

    /// The pooling cache pages come from, if the provider owns one
    pub fn pooling_cache(&self) -> Option<&Arc<AllocationPoolingCache>> {
        self.cache.as_ref()
    }
}

impl AllocatorProvider for ArenaProvider {
    fn create_scoped(&self) -> MemoryResult<Arc<dyn ScopedAllocator>> {
        let arena = self.pool.get();
        mem_debug!(arena = arena.id(), "arena handed to new scope");
        Ok(Arc::new(arena))
    }

    fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear_cached_memory();
        }
    }

    fn dispose(&self) {
        self.pool.close();
        self.clear_cache();
    }
}

impl fmt::Debug for ArenaProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaProvider")
            .field("pool", &self.pool)
            .field("client", &self.counters.snapshot())
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::Allocator;
    use crate::core::size::KB;

    #[test]
    fn test_arena_provider_recycles_arenas() {
        let provider = ArenaProvider::new(ArenaConfig::new(4 * KB)).unwrap();

        let arena = provider.create_scoped().unwrap();
        arena.allocate(100).unwrap();
        assert_eq!(provider.client_stats().current_bytes(), 100);
        arena.release();

        assert_eq!(provider.idle_arenas(), 1);
        assert!(provider.is_all_freed());

        let _again = provider.create_scoped().unwrap();
        assert_eq!(provider.idle_arenas(), 0);
    }

    #[test]
    fn test_arena_provider_over_cache_reuses_pages() {
        let provider = ArenaProvider::with_pooling_cache(
            ArenaConfig::new(4 * KB),
            PoolingCacheConfig::default(),
        )
        .unwrap();
        let cache = provider.pooling_cache().unwrap().clone();

        let arena = provider.create_scoped().unwrap();
        arena.allocate(64).unwrap();
        arena.release();
        assert!(cache.stats().cached_bytes > 0);

        let arena = provider.create_scoped().unwrap();
        arena.allocate(64).unwrap();
        arena.release();
        assert_eq!(cache.stats().hits, 1);

        provider.clear_cache();
        assert_eq!(cache.stats().cached_bytes, 0);
        assert!(provider.is_all_freed());
    }

    #[test]
    fn test_disposed_provider_stops_pooling() {
        let provider = ArenaProvider::new(ArenaConfig::new(4 * KB)).unwrap();
        provider.dispose();

        provider.create_scoped().unwrap().release();
        assert_eq!(provider.idle_arenas(), 0);
    }

    #[test]
    fn test_unscoped_providers() {
        assert!(NativeProvider.shared().is_some());
        assert!(NativeProvider.create_scoped().is_err());

        let caching = CachingProvider::new(PoolingCacheConfig::default()).unwrap();
        let shared = caching.shared().unwrap();
        let ptr = shared.allocate(32).unwrap();
        unsafe { shared.free(ptr.as_ptr()) };
        assert!(caching.cache().stats().cached_bytes > 0);

        caching.clear_cache();
        assert_eq!(caching.cache().stats().cached_bytes, 0);
    }
}
