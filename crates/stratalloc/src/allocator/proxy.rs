//! Observation wrapper reporting every operation to a sink.

use core::alloc::Layout;
use core::cell::RefCell;
use core::ptr::NonNull;
use std::sync::Arc;

use crate::allocator::event::AllocEvent;
use crate::allocator::stats::{AllocatorStats, StatisticsProvider};
use crate::allocator::traits::{Allocator, MemoryUsage, Owns, Resettable, ThreadSafeAllocator};
use crate::error::AllocResult;

/// Sink for [`AllocEvent`]s emitted by a [`ProxyAllocator`].
///
/// `record` takes `&self` so a single observer can sit behind several
/// proxies; observers that mutate keep their state in cells or atomics.
/// Implementations must not panic and must not allocate through the
/// proxied allocator they observe.
pub trait AllocationObserver {
    /// Called after each completed operation, success or failure.
    fn record(&self, event: AllocEvent);
}

impl<O: AllocationObserver + ?Sized> AllocationObserver for &O {
    fn record(&self, event: AllocEvent) {
        (**self).record(event);
    }
}

impl<O: AllocationObserver + ?Sized> AllocationObserver for Arc<O> {
    fn record(&self, event: AllocEvent) {
        (**self).record(event);
    }
}

/// In-memory event recorder, mostly for tests and debugging sessions.
#[derive(Debug, Default)]
pub struct EventLog {
    events: RefCell<Vec<AllocEvent>>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    /// The most recent event.
    #[must_use]
    pub fn last(&self) -> Option<AllocEvent> {
        self.events.borrow().last().copied()
    }

    /// Snapshot of every event in order.
    #[must_use]
    pub fn events(&self) -> Vec<AllocEvent> {
        self.events.borrow().clone()
    }

    /// Discards all recorded events.
    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl AllocationObserver for EventLog {
    fn record(&self, event: AllocEvent) {
        self.events.borrow_mut().push(event);
    }
}

/// Forwards every operation to the inner allocator and reports it to an
/// observer afterwards.
///
/// The observer sees outcomes, not intents: events carry the success flag
/// and, for resizes, whether the block moved. The proxy adds no behavior of
/// its own, so it can wrap any layer of a composition without changing what
/// the layer does.
#[derive(Debug)]
pub struct ProxyAllocator<A, O> {
    inner: A,
    observer: O,
}

impl<A, O> ProxyAllocator<A, O> {
    /// Wraps `inner`, reporting to `observer`.
    pub const fn new(inner: A, observer: O) -> Self {
        Self { inner, observer }
    }

    /// The wrapped allocator.
    pub const fn inner(&self) -> &A {
        &self.inner
    }

    /// The observer receiving events.
    pub const fn observer(&self) -> &O {
        &self.observer
    }

    /// Consumes the proxy and returns both parts.
    pub fn into_parts(self) -> (A, O) {
        (self.inner, self.observer)
    }
}

// SAFETY: Pure forwarding; observation happens after each inner operation
// completes and never touches the issued blocks.
unsafe impl<A: Allocator, O: AllocationObserver> Allocator for ProxyAllocator<A, O> {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: forwarded caller contract.
        let result = unsafe { self.inner.allocate(layout) };
        self.observer.record(AllocEvent::Allocate {
            layout,
            zeroed: false,
            succeeded: result.is_ok(),
        });
        result
    }

    unsafe fn allocate_zeroed(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: forwarded caller contract.
        let result = unsafe { self.inner.allocate_zeroed(layout) };
        self.observer.record(AllocEvent::Allocate {
            layout,
            zeroed: true,
            succeeded: result.is_ok(),
        });
        result
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.deallocate(ptr, layout) };
        self.observer.record(AllocEvent::Deallocate { layout });
    }

    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: forwarded caller contract.
        let result = unsafe { self.inner.grow(ptr, old_layout, new_layout) };
        self.observer.record(AllocEvent::Grow {
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
        self.observer.record(AllocEvent::Shrink {
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

impl<A: Owns, O: AllocationObserver> Owns for ProxyAllocator<A, O> {
    fn owns(&self, ptr: NonNull<u8>, layout: Layout) -> bool {
        let owned = self.inner.owns(ptr, layout);
        self.observer.record(AllocEvent::OwnsQuery { owned });
        owned
    }
}

impl<A: MemoryUsage, O> MemoryUsage for ProxyAllocator<A, O> {
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

impl<A: Resettable, O> Resettable for ProxyAllocator<A, O> {
    unsafe fn reset(&self) {
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.reset() };
    }

    fn can_reset(&self) -> bool {
        self.inner.can_reset()
    }
}

impl<A: StatisticsProvider, O> StatisticsProvider for ProxyAllocator<A, O> {
    fn statistics(&self) -> AllocatorStats {
        self.inner.statistics()
    }

    fn reset_statistics(&self) {
        self.inner.reset_statistics();
    }

    fn statistics_enabled(&self) -> bool {
        self.inner.statistics_enabled()
    }
}

// SAFETY: Forwarding plus an observer that is itself shareable.
unsafe impl<A, O> ThreadSafeAllocator for ProxyAllocator<A, O>
where
    A: ThreadSafeAllocator,
    O: AllocationObserver + Send + Sync,
{
}
