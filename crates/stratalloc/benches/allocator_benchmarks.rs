//! Allocator benchmarks
//!
//! Compares leaf allocators, diagnostic wrappers and composed stacks across
//! common workloads.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::alloc::Layout;
use std::hint::black_box;

use stratalloc::allocator::{
    AffixAllocator, Allocator, BumpAllocator, FallbackAllocator, PoolAllocator, SystemAllocator,
    TrackExt,
};

/// Benchmark single allocation/deallocation cycle
fn bench_single_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_allocation");

    group.bench_function("bump_64b", |b| {
        let allocator = BumpAllocator::new(1024 * 1024).unwrap();
        let layout = Layout::from_size_align(64, 8).unwrap();

        b.iter(|| unsafe {
            let ptr = allocator.allocate(layout).unwrap();
            allocator.deallocate(ptr.cast(), layout);
            black_box(ptr);
        });
    });

    group.bench_function("pool_64b", |b| {
        let allocator = PoolAllocator::<_, 64>::new(SystemAllocator::new()).unwrap();
        let layout = Layout::from_size_align(64, 8).unwrap();

        b.iter(|| unsafe {
            let ptr = allocator.allocate(layout).unwrap();
            allocator.deallocate(ptr.cast(), layout);
            black_box(ptr);
        });
    });

    // Baseline
    group.bench_function("system_64b", |b| {
        let allocator = SystemAllocator::new();
        let layout = Layout::from_size_align(64, 8).unwrap();

        b.iter(|| unsafe {
            let ptr = allocator.allocate(layout).unwrap();
            allocator.deallocate(ptr.cast(), layout);
            black_box(ptr);
        });
    });

    group.finish();
}

/// Benchmark the cost of the diagnostic wrappers over a bare allocator
fn bench_diagnostic_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("diagnostic_overhead");
    let layout = Layout::from_size_align(64, 8).unwrap();

    group.bench_function("system_bare", |b| {
        let allocator = SystemAllocator::new();

        b.iter(|| unsafe {
            let ptr = allocator.allocate(layout).unwrap();
            allocator.deallocate(ptr.cast(), layout);
            black_box(ptr);
        });
    });

    group.bench_function("system_affixed", |b| {
        let allocator = AffixAllocator::<_>::new(SystemAllocator::new());

        b.iter(|| unsafe {
            let ptr = allocator.allocate(layout).unwrap();
            allocator.deallocate(ptr.cast(), layout);
            black_box(ptr);
        });
    });

    group.bench_function("system_tracked", |b| {
        let allocator = SystemAllocator::new().with_tracking();

        b.iter(|| unsafe {
            let ptr = allocator.allocate(layout).unwrap();
            allocator.deallocate(ptr.cast(), layout);
            black_box(ptr);
        });
    });

    group.bench_function("system_affixed_tracked", |b| {
        let allocator = AffixAllocator::<_>::new(SystemAllocator::new()).with_tracking();

        b.iter(|| unsafe {
            let ptr = allocator.allocate(layout).unwrap();
            allocator.deallocate(ptr.cast(), layout);
            black_box(ptr);
        });
    });

    group.finish();
}

/// Benchmark composed stacks against their parts
fn bench_composed_stacks(c: &mut Criterion) {
    let mut group = c.benchmark_group("composed_stacks");
    let layout = Layout::from_size_align(64, 8).unwrap();

    group.bench_function("pool_over_bump", |b| {
        let allocator =
            PoolAllocator::<_, 64>::new(BumpAllocator::new(1024 * 1024).unwrap()).unwrap();

        b.iter(|| unsafe {
            let ptr = allocator.allocate(layout).unwrap();
            allocator.deallocate(ptr.cast(), layout);
            black_box(ptr);
        });
    });

    group.bench_function("fallback_primary_hit", |b| {
        let pool = PoolAllocator::<_, 64>::new(BumpAllocator::new(1024 * 1024).unwrap()).unwrap();
        let allocator = FallbackAllocator::new(pool, SystemAllocator::new());

        b.iter(|| unsafe {
            let ptr = allocator.allocate(layout).unwrap();
            allocator.deallocate(ptr.cast(), layout);
            black_box(ptr);
        });
    });

    group.bench_function("fallback_spill", |b| {
        // A one-slab primary held full, so every request takes the miss path.
        let pool = PoolAllocator::<_, 64>::new(BumpAllocator::new(64).unwrap()).unwrap();
        let allocator = FallbackAllocator::new(pool, SystemAllocator::new());
        let _held = unsafe { allocator.allocate(layout).unwrap() };

        b.iter(|| unsafe {
            let ptr = allocator.allocate(layout).unwrap();
            allocator.deallocate(ptr.cast(), layout);
            black_box(ptr);
        });
    });

    group.finish();
}

/// Benchmark different allocation sizes
fn bench_allocation_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation_sizes");

    for size in [16, 64, 256, 1024, 4096].iter() {
        group.bench_with_input(BenchmarkId::new("bump", size), size, |b, &size| {
            let allocator = BumpAllocator::new(1024 * 1024).unwrap();
            let layout = Layout::from_size_align(size, 8).unwrap();

            b.iter(|| unsafe {
                let ptr = allocator.allocate(layout).unwrap();
                allocator.deallocate(ptr.cast(), layout);
                black_box(ptr);
            });
        });

        group.bench_with_input(BenchmarkId::new("system", size), size, |b, &size| {
            let allocator = SystemAllocator::new();
            let layout = Layout::from_size_align(size, 8).unwrap();

            b.iter(|| unsafe {
                let ptr = allocator.allocate(layout).unwrap();
                allocator.deallocate(ptr.cast(), layout);
                black_box(ptr);
            });
        });
    }

    group.finish();
}

/// Benchmark batch allocations
fn bench_batch_allocations(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_allocations");
    group.throughput(Throughput::Elements(100));

    group.bench_function("bump_100x64b", |b| {
        let allocator = BumpAllocator::new(1024 * 1024).unwrap();
        let layout = Layout::from_size_align(64, 8).unwrap();

        b.iter(|| unsafe {
            let mut ptrs = Vec::with_capacity(100);
            for _ in 0..100 {
                ptrs.push(allocator.allocate(layout).unwrap());
            }
            // LIFO frees retract the cursor, so the arena never fills.
            for ptr in ptrs.into_iter().rev() {
                allocator.deallocate(ptr.cast(), layout);
            }
        });
    });

    group.bench_function("pool_100x64b", |b| {
        let allocator = PoolAllocator::<_, 64>::new(SystemAllocator::new()).unwrap();
        let layout = Layout::from_size_align(64, 8).unwrap();

        b.iter(|| unsafe {
            let mut ptrs = Vec::with_capacity(100);
            for _ in 0..100 {
                ptrs.push(allocator.allocate(layout).unwrap());
            }
            for ptr in ptrs {
                allocator.deallocate(ptr.cast(), layout);
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_allocation,
    bench_diagnostic_overhead,
    bench_composed_stacks,
    bench_allocation_sizes,
    bench_batch_allocations
);

criterion_main!(benches);
