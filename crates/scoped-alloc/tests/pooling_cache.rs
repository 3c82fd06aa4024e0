use std::sync::Arc;
use std::thread;
use std::time::Duration;

use proptest::prelude::*;
use proptest::sample::Index;
use scoped_alloc::allocator::{Allocator, NativeAllocator, TrackedAllocator};
use scoped_alloc::cache::{AllocationPoolingCache, PoolingCacheConfig};

fn tracked() -> Arc<TrackedAllocator<NativeAllocator>> {
    Arc::new(TrackedAllocator::new(NativeAllocator::new()))
}

/// Allocates and immediately frees `size` bytes
fn cycle(cache: &AllocationPoolingCache, size: usize) {
    let ptr = cache.allocate(size).unwrap();
    unsafe { cache.free(ptr.as_ptr()) };
}

#[test]
fn test_ttl_decays_under_pure_hits() {
    let config = PoolingCacheConfig::default()
        .with_initial_ttl(Duration::from_millis(500))
        .with_ttl_step(Duration::from_millis(100))
        .with_window_len(4);
    let cache = AllocationPoolingCache::with_config(NativeAllocator::shared(), config);

    // First use is a fresh allocation; it creates the bucket on free
    cycle(&cache, 100);
    let mut previous = cache.ttl_for(100).unwrap();
    assert_eq!(previous, Duration::from_millis(500));

    for round in 1..=12 {
        cycle(&cache, 100);
        let ttl = cache.ttl_for(100).unwrap();
        assert!(ttl <= previous, "ttl grew in round {round}");
        if round >= 4 && previous > Duration::ZERO {
            assert!(ttl < previous, "ttl did not decay in round {round}");
        }
        previous = ttl;
    }

    assert_eq!(previous, Duration::ZERO);
    assert_eq!(cache.stats().hits, 12);
    cache.clear_cached_memory();
}

#[test]
fn test_prune_honors_each_size_class_ttl() {
    let backing = tracked();
    let cache = AllocationPoolingCache::new(backing.clone());
    cache.set_ttl_for(64, Duration::from_millis(5)).unwrap();
    cache.set_ttl_for(4000, Duration::from_secs(3600)).unwrap();

    cycle(&cache, 64);
    cycle(&cache, 4000);
    thread::sleep(Duration::from_millis(30));

    let released = cache.prune(None);
    assert_eq!(released, cache.size_class(64).unwrap());

    let stats = cache.stats();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.cached_blocks, 1);
    assert_eq!(stats.cached_bytes, cache.size_class(4000).unwrap());

    // The long-lived class is still served from cache
    let hits = stats.hits;
    cycle(&cache, 4000);
    assert_eq!(cache.stats().hits, hits + 1);

    cache.clear_cached_memory();
    assert!(backing.is_all_freed());
}

#[test]
fn test_prune_with_threshold_stops_early() {
    let cache = AllocationPoolingCache::new(NativeAllocator::shared());
    cache.set_ttl_for(64, Duration::ZERO).unwrap();

    let ptrs: Vec<_> = (0..8).map(|_| cache.allocate(64).unwrap()).collect();
    for (i, ptr) in ptrs.iter().enumerate() {
        unsafe { cache.free(ptr.as_ptr()) };
        // Separate runs: touch another class in between
        if i % 2 == 0 {
            cycle(&cache, 2000 + i);
        }
    }
    thread::sleep(Duration::from_millis(5));

    let class = cache.size_class(64).unwrap();
    let before = cache.stats().cached_bytes;
    // The oldest run holds a single block, which is exactly enough
    let released = cache.prune(Some(before - class));
    assert_eq!(released, class);
    assert_eq!(cache.stats().cached_bytes, before - class);
    cache.clear_cached_memory();
}

#[test]
fn test_realloc_within_padding_only() {
    let cache = AllocationPoolingCache::new(NativeAllocator::shared());
    let ptr = cache.allocate(100).unwrap();
    let capacity = cache.size_class(100).unwrap() - cache.metadata_overhead();

    unsafe {
        let grown = cache.try_realloc(ptr, capacity, capacity).unwrap();
        assert_eq!(grown.ptr, ptr);
        assert_eq!(grown.size, capacity);
        assert!(cache.try_realloc(ptr, capacity + 1, capacity + 1).is_none());
        cache.free(ptr.as_ptr());
    }
    assert!(cache.client_is_all_freed());
    cache.clear_cached_memory();
}

#[test]
fn test_free_null_is_noop() {
    let backing = tracked();
    let cache = AllocationPoolingCache::new(backing.clone());
    unsafe {
        cache.free(std::ptr::null_mut());
        backing.free(std::ptr::null_mut());
    }

    let stats = cache.stats();
    assert_eq!(stats.cached_blocks, 0);
    assert!(cache.client_is_all_freed());
    assert_eq!(backing.stats().free_count, 0);
    assert!(backing.is_all_freed());
}

#[derive(Debug, Clone)]
enum Op {
    Allocate(usize),
    Free(Index),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0usize..6000).prop_map(Op::Allocate),
        2 => any::<Index>().prop_map(Op::Free),
    ]
}

proptest! {
    #[test]
    fn prop_clear_drains_everything(ops in prop::collection::vec(op(), 1..200)) {
        let backing = tracked();
        let config = PoolingCacheConfig::default()
            .with_cleanup_threshold(8192)
            .with_max_item_size(4096)
            .with_initial_ttl(Duration::ZERO)
            .with_max_prune_failures(3);
        let cache = AllocationPoolingCache::with_config(backing.clone(), config);

        let mut live = Vec::new();
        for op in ops {
            match op {
                Op::Allocate(size) => live.push(cache.allocate(size).unwrap()),
                Op::Free(index) if !live.is_empty() => {
                    let ptr = live.swap_remove(index.index(live.len()));
                    unsafe { cache.free(ptr.as_ptr()) };
                }
                Op::Free(_) => {}
            }
        }
        for ptr in live {
            unsafe { cache.free(ptr.as_ptr()) };
        }

        prop_assert!(cache.client_is_all_freed());
        cache.clear_cached_memory();
        prop_assert!(cache.is_all_freed());
        prop_assert!(backing.is_all_freed());
    }
}
