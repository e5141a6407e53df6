//! Statistics-collecting allocator wrappers.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::allocator::event::AllocEvent;
use crate::allocator::filters::{CountAll, EventFilter};
use crate::allocator::stats::{
    AllocatorStats, AtomicAllocatorStats, LocalAllocatorStats, StatisticsProvider,
};
use crate::allocator::traits::{Allocator, MemoryUsage, Owns, Resettable, ThreadSafeAllocator};
use crate::error::AllocResult;

/// Wraps an allocator and counts its operations into atomic statistics.
///
/// The filter decides which events are counted;
/// [`CountAll`] is the default. Ownership queries route through untouched,
/// so composites that route by `owns` on the hot path do not skew numbers.
///
/// The counters are atomic, so the wrapper is as shareable as its inner
/// allocator. For strictly single-threaded stacks
/// [`LocalTrackedAllocator`] skips the atomics.
#[derive(Debug, Default)]
pub struct TrackedAllocator<A, F = CountAll> {
    inner: A,
    filter: F,
    stats: AtomicAllocatorStats,
}

impl<A> TrackedAllocator<A, CountAll> {
    /// Wraps `inner`, counting every operation.
    pub const fn new(inner: A) -> Self {
        Self { inner, filter: CountAll, stats: AtomicAllocatorStats::new() }
    }
}

impl<A, F> TrackedAllocator<A, F> {
    /// Wraps `inner`, counting only events `filter` accepts.
    pub const fn with_filter(inner: A, filter: F) -> Self {
        Self { inner, filter, stats: AtomicAllocatorStats::new() }
    }

    /// The wrapped allocator.
    pub const fn inner(&self) -> &A {
        &self.inner
    }

    /// Mutable access to the wrapped allocator.
    pub const fn inner_mut(&mut self) -> &mut A {
        &mut self.inner
    }

    /// The active filter.
    pub const fn filter(&self) -> &F {
        &self.filter
    }

    /// Consumes the wrapper and returns the inner allocator.
    pub fn into_inner(self) -> A {
        self.inner
    }

    /// Whether counted allocations are still outstanding.
    #[must_use]
    pub fn has_leaks(&self) -> bool {
        self.stats.snapshot().has_leaks()
    }
}

impl<A, F: EventFilter> TrackedAllocator<A, F> {
    fn observe(&self, event: AllocEvent) {
        if self.filter.should_count(&event) {
            self.stats.record_event(&event);
        }
    }
}

// SAFETY: Pure forwarding; counting happens after each inner operation and
// never touches the issued blocks.
unsafe impl<A: Allocator, F: EventFilter> Allocator for TrackedAllocator<A, F> {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: forwarded caller contract.
        let result = unsafe { self.inner.allocate(layout) };
        self.observe(AllocEvent::Allocate { layout, zeroed: false, succeeded: result.is_ok() });
        result
    }

    unsafe fn allocate_zeroed(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: forwarded caller contract.
        let result = unsafe { self.inner.allocate_zeroed(layout) };
        self.observe(AllocEvent::Allocate { layout, zeroed: true, succeeded: result.is_ok() });
        result
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.deallocate(ptr, layout) };
        self.observe(AllocEvent::Deallocate { layout });
    }

    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: forwarded caller contract.
        let result = unsafe { self.inner.grow(ptr, old_layout, new_layout) };
        self.observe(AllocEvent::Grow {
            old_layout,
            new_layout,
            succeeded: result.is_ok(),
            in_place: result.as_ref().is_ok_and(|block| block.cast::<u8>() == ptr),
        });
        result
    }

    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: forwarded caller contract.
        let result = unsafe { self.inner.shrink(ptr, old_layout, new_layout) };
        self.observe(AllocEvent::Shrink {
            old_layout,
            new_layout,
            succeeded: result.is_ok(),
            in_place: result.as_ref().is_ok_and(|block| block.cast::<u8>() == ptr),
        });
        result
    }

    fn max_allocation_size(&self) -> usize {
        self.inner.max_allocation_size()
    }

    fn supports_zero_sized_allocations(&self) -> bool {
        self.inner.supports_zero_sized_allocations()
    }
}

impl<A: Owns, F> Owns for TrackedAllocator<A, F> {
    fn owns(&self, ptr: NonNull<u8>, layout: Layout) -> bool {
        self.inner.owns(ptr, layout)
    }
}

impl<A, F> StatisticsProvider for TrackedAllocator<A, F> {
    fn statistics(&self) -> AllocatorStats {
        self.stats.snapshot()
    }

    fn reset_statistics(&self) {
        self.stats.reset();
    }
}

impl<A: MemoryUsage, F> MemoryUsage for TrackedAllocator<A, F> {
    fn used_memory(&self) -> usize {
        self.inner.used_memory()
    }

    fn available_memory(&self) -> Option<usize> {
        self.inner.available_memory()
    }

    fn total_memory(&self) -> Option<usize> {
        self.inner.total_memory()
    }
}

impl<A: Resettable, F> Resettable for TrackedAllocator<A, F> {
    unsafe fn reset(&self) {
        // SAFETY: forwarded caller contract; the counters restart with the
        // allocator.
        unsafe { self.inner.reset() };
        self.stats.reset();
    }

    fn can_reset(&self) -> bool {
        self.inner.can_reset()
    }
}

// SAFETY: The counters are atomic; thread safety reduces to the inner
// allocator and the filter.
unsafe impl<A, F> ThreadSafeAllocator for TrackedAllocator<A, F>
where
    A: ThreadSafeAllocator,
    F: EventFilter + Send + Sync,
{
}

/// Single-threaded twin of [`TrackedAllocator`].
///
/// Counts into plain cells instead of atomics. That makes it `!Sync`, which
/// is the point: a tracked bump or pool stack stays compile-time confined
/// to one thread.
///
/// ```compile_fail
/// use stratalloc::allocator::{LocalTrackedAllocator, SystemAllocator};
/// fn assert_sync<T: Sync>() {}
/// assert_sync::<LocalTrackedAllocator<SystemAllocator>>();
/// ```
#[derive(Debug, Default)]
pub struct LocalTrackedAllocator<A, F = CountAll> {
    inner: A,
    filter: F,
    stats: LocalAllocatorStats,
}

impl<A> LocalTrackedAllocator<A, CountAll> {
    /// Wraps `inner`, counting every operation.
    pub const fn new(inner: A) -> Self {
        Self { inner, filter: CountAll, stats: LocalAllocatorStats::new() }
    }
}

impl<A, F> LocalTrackedAllocator<A, F> {
    /// Wraps `inner`, counting only events `filter` accepts.
    pub const fn with_filter(inner: A, filter: F) -> Self {
        Self { inner, filter, stats: LocalAllocatorStats::new() }
    }

    /// The wrapped allocator.
    pub const fn inner(&self) -> &A {
        &self.inner
    }

    /// Mutable access to the wrapped allocator.
    pub const fn inner_mut(&mut self) -> &mut A {
        &mut self.inner
    }

    /// The active filter.
    pub const fn filter(&self) -> &F {
        &self.filter
    }

    /// Consumes the wrapper and returns the inner allocator.
    pub fn into_inner(self) -> A {
        self.inner
    }

    /// Whether counted allocations are still outstanding.
    #[must_use]
    pub fn has_leaks(&self) -> bool {
        self.stats.snapshot().has_leaks()
    }
}

impl<A, F: EventFilter> LocalTrackedAllocator<A, F> {
    fn observe(&self, event: AllocEvent) {
        if self.filter.should_count(&event) {
            self.stats.record_event(&event);
        }
    }
}

// SAFETY: Same forwarding argument as TrackedAllocator.
unsafe impl<A: Allocator, F: EventFilter> Allocator for LocalTrackedAllocator<A, F> {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: forwarded caller contract.
        let result = unsafe { self.inner.allocate(layout) };
        self.observe(AllocEvent::Allocate { layout, zeroed: false, succeeded: result.is_ok() });
        result
    }

    unsafe fn allocate_zeroed(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: forwarded caller contract.
        let result = unsafe { self.inner.allocate_zeroed(layout) };
        self.observe(AllocEvent::Allocate { layout, zeroed: true, succeeded: result.is_ok() });
        result
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.deallocate(ptr, layout) };
        self.observe(AllocEvent::Deallocate { layout });
    }

    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: forwarded caller contract.
        let result = unsafe { self.inner.grow(ptr, old_layout, new_layout) };
        self.observe(AllocEvent::Grow {
            old_layout,
            new_layout,
            succeeded: result.is_ok(),
            in_place: result.as_ref().is_ok_and(|block| block.cast::<u8>() == ptr),
        });
        result
    }

    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: forwarded caller contract.
        let result = unsafe { self.inner.shrink(ptr, old_layout, new_layout) };
        self.observe(AllocEvent::Shrink {
            old_layout,
            new_layout,
            succeeded: result.is_ok(),
            in_place: result.as_ref().is_ok_and(|block| block.cast::<u8>() == ptr),
        });
        result
    }

    fn max_allocation_size(&self) -> usize {
        self.inner.max_allocation_size()
    }

    fn supports_zero_sized_allocations(&self) -> bool {
        self.inner.supports_zero_sized_allocations()
    }
}

impl<A: Owns, F> Owns for LocalTrackedAllocator<A, F> {
    fn owns(&self, ptr: NonNull<u8>, layout: Layout) -> bool {
        self.inner.owns(ptr, layout)
    }
}

impl<A, F> StatisticsProvider for LocalTrackedAllocator<A, F> {
    fn statistics(&self) -> AllocatorStats {
        self.stats.snapshot()
    }

    fn reset_statistics(&self) {
        self.stats.reset();
    }
}

impl<A: MemoryUsage, F> MemoryUsage for LocalTrackedAllocator<A, F> {
    fn used_memory(&self) -> usize {
        self.inner.used_memory()
    }

    fn available_memory(&self) -> Option<usize> {
        self.inner.available_memory()
    }

    fn total_memory(&self) -> Option<usize> {
        self.inner.total_memory()
    }
}

impl<A: Resettable, F> Resettable for LocalTrackedAllocator<A, F> {
    unsafe fn reset(&self) {
        // SAFETY: forwarded caller contract; the counters restart with the
        // allocator.
        unsafe { self.inner.reset() };
        self.stats.reset();
    }

    fn can_reset(&self) -> bool {
        self.inner.can_reset()
    }
}

/// Shorthand for wrapping any allocator in tracking.
pub trait TrackExt: Sized {
    /// Wraps `self` in a [`TrackedAllocator`] counting everything.
    fn with_tracking(self) -> TrackedAllocator<Self, CountAll> {
        TrackedAllocator::new(self)
    }

    /// Wraps `self` in a [`LocalTrackedAllocator`] counting everything.
    fn with_local_tracking(self) -> LocalTrackedAllocator<Self, CountAll> {
        LocalTrackedAllocator::new(self)
    }
}

impl<A: Allocator> TrackExt for A {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::filters::{AllocInitFilter, ReallocPlacementFilter, ResultFilter};
    use crate::allocator::{BumpAllocator, NullAllocator, SystemAllocator};

    #[test]
    fn test_counts_allocations_and_frees() {
        let tracked = SystemAllocator::new().with_tracking();
        let layout = Layout::from_size_align(64, 8).unwrap();

        unsafe {
            let block = tracked.allocate(layout).unwrap();
            tracked.deallocate(block.cast(), layout);
        }

        let stats = tracked.statistics();
        assert_eq!(stats.allocation_count, 1);
        assert_eq!(stats.deallocation_count, 1);
        assert_eq!(stats.allocated_bytes, 0);
        assert_eq!(stats.peak_allocated_bytes, 64);
        assert!(!tracked.has_leaks());
    }

    #[test]
    fn test_leak_detection() {
        let tracked = SystemAllocator::new().with_tracking();
        let layout = Layout::from_size_align(32, 8).unwrap();

        unsafe {
            let block = tracked.allocate(layout).unwrap();
            assert!(tracked.has_leaks());
            tracked.deallocate(block.cast(), layout);
        }
        assert!(!tracked.has_leaks());
    }

    #[test]
    fn test_failures_only_filter() {
        let tracked = TrackedAllocator::with_filter(NullAllocator::new(), ResultFilter::Failures);
        let layout = Layout::from_size_align(16, 8).unwrap();

        let _ = unsafe { tracked.allocate(layout) };
        let stats = tracked.statistics();
        assert_eq!(stats.failed_allocations, 1);
        assert_eq!(stats.allocation_count, 0);

        let successes_only =
            TrackedAllocator::with_filter(SystemAllocator::new(), ResultFilter::Failures);
        unsafe {
            let block = successes_only.allocate(layout).unwrap();
            successes_only.deallocate(block.cast(), layout);
        }
        assert_eq!(successes_only.statistics(), AllocatorStats::new());
    }

    #[test]
    fn test_zeroed_only_filter() {
        let tracked =
            TrackedAllocator::with_filter(SystemAllocator::new(), AllocInitFilter::Zeroed);
        let layout = Layout::from_size_align(16, 8).unwrap();

        unsafe {
            let plain = tracked.allocate(layout).unwrap();
            let zeroed = tracked.allocate_zeroed(layout).unwrap();
            tracked.deallocate(plain.cast(), layout);
            tracked.deallocate(zeroed.cast(), layout);
        }

        let stats = tracked.statistics();
        assert_eq!(stats.allocation_count, 1);
        assert_eq!(stats.deallocation_count, 2);
    }

    #[test]
    fn test_in_place_filter_on_bump() {
        let tracked = LocalTrackedAllocator::with_filter(
            BumpAllocator::new(256).unwrap(),
            ReallocPlacementFilter::InPlace,
        );
        let small = Layout::from_size_align(32, 8).unwrap();
        let large = Layout::from_size_align(64, 8).unwrap();

        unsafe {
            let block = tracked.allocate(small).unwrap();
            let _grown = tracked.grow(block.cast(), small, large).unwrap();
        }

        assert_eq!(tracked.statistics().reallocation_count, 1);
    }

    #[test]
    fn test_owns_queries_not_counted() {
        let tracked = BumpAllocator::new(128).unwrap().with_local_tracking();
        let layout = Layout::from_size_align(32, 8).unwrap();

        unsafe {
            let block = tracked.allocate(layout).unwrap();
            assert!(tracked.owns(block.cast(), layout));
            assert!(tracked.owns(block.cast(), layout));
            tracked.deallocate(block.cast(), layout);
        }

        let stats = tracked.statistics();
        assert_eq!(stats.allocation_count, 1);
        assert_eq!(stats.deallocation_count, 1);
    }

    #[test]
    fn test_reset_clears_inner_and_stats() {
        let tracked = BumpAllocator::new(256).unwrap().with_local_tracking();
        let layout = Layout::from_size_align(64, 8).unwrap();

        unsafe {
            let _block = tracked.allocate(layout).unwrap();
            tracked.reset();
        }

        assert_eq!(tracked.inner().used(), 0);
        assert_eq!(tracked.statistics(), AllocatorStats::new());
    }

    #[test]
    fn test_usage_forwarding() {
        let tracked = BumpAllocator::new(512).unwrap().with_tracking();
        let layout = Layout::from_size_align(128, 8).unwrap();

        unsafe {
            let _block = tracked.allocate(layout).unwrap();
        }

        assert_eq!(tracked.used_memory(), 128);
        assert_eq!(tracked.total_memory(), Some(512));
    }
}
