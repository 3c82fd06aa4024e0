//! Allocator benchmarks
//!
//! Compares the arena, the pooling cache and the native allocator on
//! small-block churn, and measures the cost of opening and closing scopes.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use scoped_alloc::allocator::{Allocator, NativeAllocator, ScopedAllocator};
use scoped_alloc::arena::{ArenaAllocator, ArenaConfig};
use scoped_alloc::cache::{AllocationPoolingCache, PoolingCacheConfig};
use scoped_alloc::scope::{AllocatorScopeManager, ArenaProvider, ProviderId};

const SCRATCH: ProviderId = ProviderId::new(1);

/// Benchmark single allocation/free cycle
fn bench_single_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_allocation");

    for size in [16usize, 64, 512] {
        group.bench_with_input(BenchmarkId::new("arena", size), &size, |b, &size| {
            let arena = ArenaAllocator::with_config(
                NativeAllocator::shared(),
                ArenaConfig::production(),
            );
            b.iter(|| unsafe {
                let ptr = arena.allocate(size).unwrap();
                arena.free(black_box(ptr).as_ptr());
            });
        });

        group.bench_with_input(BenchmarkId::new("pooling_cache", size), &size, |b, &size| {
            let cache = AllocationPoolingCache::new(NativeAllocator::shared());
            b.iter(|| unsafe {
                let ptr = cache.allocate(size).unwrap();
                cache.free(black_box(ptr).as_ptr());
            });
            cache.clear_cached_memory();
        });

        group.bench_with_input(BenchmarkId::new("native", size), &size, |b, &size| {
            let native = NativeAllocator::new();
            b.iter(|| unsafe {
                let ptr = native.allocate(size).unwrap();
                native.free(black_box(ptr).as_ptr());
            });
        });
    }

    group.finish();
}

/// Benchmark batch allocations released all at once
fn bench_batch_allocations(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_allocations");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("arena_1000x48b_free_all", |b| {
        let arena = ArenaAllocator::with_config(NativeAllocator::shared(), ArenaConfig::production());
        b.iter(|| {
            for _ in 0..1000 {
                black_box(arena.allocate(48).unwrap());
            }
            arena.free_all_allocations();
        });
    });

    group.bench_function("pooling_cache_1000x48b", |b| {
        let cache = AllocationPoolingCache::with_config(
            NativeAllocator::shared(),
            PoolingCacheConfig::production(),
        );
        let mut ptrs = Vec::with_capacity(1000);
        b.iter(|| {
            for _ in 0..1000 {
                ptrs.push(cache.allocate(48).unwrap());
            }
            for ptr in ptrs.drain(..) {
                unsafe { cache.free(ptr.as_ptr()) };
            }
        });
        cache.clear_cached_memory();
    });

    group.bench_function("native_1000x48b", |b| {
        let native = NativeAllocator::new();
        let mut ptrs = Vec::with_capacity(1000);
        b.iter(|| {
            for _ in 0..1000 {
                ptrs.push(native.allocate(48).unwrap());
            }
            for ptr in ptrs.drain(..) {
                unsafe { native.free(ptr.as_ptr()) };
            }
        });
    });

    group.finish();
}

/// Benchmark opening a scope, allocating in it and ending it
fn bench_scopes(c: &mut Criterion) {
    let mut group = c.benchmark_group("scopes");

    for (name, provider) in [
        (
            "arena_over_native",
            ArenaProvider::new(ArenaConfig::production()).unwrap(),
        ),
        (
            "arena_over_cache",
            ArenaProvider::with_pooling_cache(
                ArenaConfig::production(),
                PoolingCacheConfig::production(),
            )
            .unwrap(),
        ),
    ] {
        let manager = AllocatorScopeManager::new();
        manager
            .register_provider(Arc::new(provider), SCRATCH, true)
            .unwrap();
        manager.finalize_configuration().unwrap();

        group.bench_function(name, |b| {
            b.iter(|| {
                let _scope = manager.begin_scope(SCRATCH).unwrap();
                manager
                    .with_allocator(SCRATCH, |allocator| {
                        for size in [24, 200, 1500] {
                            black_box(allocator.allocate(size).unwrap());
                        }
                    })
                    .unwrap();
            });
        });

        manager.clear_providers_and_allocations();
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_allocation,
    bench_batch_allocations,
    bench_scopes
);
criterion_main!(benches);
