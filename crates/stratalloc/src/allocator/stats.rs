//! Allocation statistics: snapshots, single-threaded and atomic recorders.

use core::cell::Cell;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::allocator::event::AllocEvent;
use crate::allocator::proxy::AllocationObserver;
use crate::utils::atomic_max;

/// Access to collected statistics.
pub trait StatisticsProvider {
    /// Snapshot of the current numbers.
    fn statistics(&self) -> AllocatorStats;

    /// Zeroes the collected numbers.
    fn reset_statistics(&self);

    /// Whether statistics are being collected at all.
    fn statistics_enabled(&self) -> bool {
        true
    }
}

/// Point-in-time allocator statistics.
///
/// All counters saturate instead of wrapping. When a recorder sits behind
/// an [`EventFilter`](crate::allocator::EventFilter) the numbers describe
/// only the counted subset, so a filtered recorder may well see a
/// deallocation whose allocation was never counted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Bytes currently allocated.
    pub allocated_bytes: usize,
    /// Highest value `allocated_bytes` has reached.
    pub peak_allocated_bytes: usize,
    /// Successful allocations.
    pub allocation_count: usize,
    /// Deallocations.
    pub deallocation_count: usize,
    /// Successful grows and shrinks.
    pub reallocation_count: usize,
    /// Failed allocations, grows and shrinks.
    pub failed_allocations: usize,
    /// Cumulative bytes ever allocated.
    pub total_bytes_allocated: usize,
    /// Cumulative bytes ever deallocated.
    pub total_bytes_deallocated: usize,
}

impl AllocatorStats {
    /// An all-zero snapshot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            allocated_bytes: 0,
            peak_allocated_bytes: 0,
            allocation_count: 0,
            deallocation_count: 0,
            reallocation_count: 0,
            failed_allocations: 0,
            total_bytes_allocated: 0,
            total_bytes_deallocated: 0,
        }
    }

    /// Allocations not yet matched by a deallocation.
    #[must_use]
    pub const fn outstanding_allocations(&self) -> usize {
        self.allocation_count.saturating_sub(self.deallocation_count)
    }

    /// Average size of counted allocations, if any happened.
    #[must_use]
    pub fn average_allocation_size(&self) -> Option<f64> {
        if self.allocation_count > 0 {
            Some(self.total_bytes_allocated as f64 / self.allocation_count as f64)
        } else {
            None
        }
    }

    /// Fraction of allocation attempts that succeeded.
    #[must_use]
    pub fn allocation_efficiency(&self) -> f64 {
        let attempts = self.allocation_count + self.failed_allocations;
        if attempts > 0 {
            self.allocation_count as f64 / attempts as f64
        } else {
            1.0
        }
    }

    /// Whether memory or allocations are still outstanding.
    #[must_use]
    pub const fn has_leaks(&self) -> bool {
        self.allocated_bytes > 0 || self.allocation_count > self.deallocation_count
    }

    fn record_event(&mut self, event: &AllocEvent) {
        match *event {
            AllocEvent::Allocate { layout, succeeded, .. } => {
                if succeeded {
                    self.record_allocation(layout.size());
                } else {
                    self.failed_allocations = self.failed_allocations.saturating_add(1);
                }
            }
            AllocEvent::Grow { old_layout, new_layout, succeeded, .. }
            | AllocEvent::Shrink { old_layout, new_layout, succeeded, .. } => {
                if succeeded {
                    self.record_reallocation(old_layout.size(), new_layout.size());
                } else {
                    self.failed_allocations = self.failed_allocations.saturating_add(1);
                }
            }
            AllocEvent::Deallocate { layout } => self.record_deallocation(layout.size()),
            AllocEvent::OwnsQuery { .. } => {}
        }
    }

    fn record_allocation(&mut self, size: usize) {
        self.allocation_count = self.allocation_count.saturating_add(1);
        self.total_bytes_allocated = self.total_bytes_allocated.saturating_add(size);
        self.allocated_bytes = self.allocated_bytes.saturating_add(size);
        if self.allocated_bytes > self.peak_allocated_bytes {
            self.peak_allocated_bytes = self.allocated_bytes;
        }
    }

    fn record_deallocation(&mut self, size: usize) {
        self.deallocation_count = self.deallocation_count.saturating_add(1);
        self.total_bytes_deallocated = self.total_bytes_deallocated.saturating_add(size);
        self.allocated_bytes = self.allocated_bytes.saturating_sub(size);
    }

    fn record_reallocation(&mut self, old_size: usize, new_size: usize) {
        self.reallocation_count = self.reallocation_count.saturating_add(1);
        if new_size > old_size {
            let diff = new_size - old_size;
            self.allocated_bytes = self.allocated_bytes.saturating_add(diff);
            self.total_bytes_allocated = self.total_bytes_allocated.saturating_add(diff);
            if self.allocated_bytes > self.peak_allocated_bytes {
                self.peak_allocated_bytes = self.allocated_bytes;
            }
        } else {
            let diff = old_size - new_size;
            self.allocated_bytes = self.allocated_bytes.saturating_sub(diff);
            self.total_bytes_deallocated = self.total_bytes_deallocated.saturating_add(diff);
        }
    }
}

impl core::fmt::Display for AllocatorStats {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Allocator statistics:")?;
        writeln!(f, "  Current allocated: {} bytes", self.allocated_bytes)?;
        writeln!(f, "  Peak allocated: {} bytes", self.peak_allocated_bytes)?;
        writeln!(f, "  Allocations: {}", self.allocation_count)?;
        writeln!(f, "  Deallocations: {}", self.deallocation_count)?;
        writeln!(f, "  Reallocations: {}", self.reallocation_count)?;
        writeln!(f, "  Failed operations: {}", self.failed_allocations)?;
        if let Some(avg) = self.average_allocation_size() {
            writeln!(f, "  Average allocation size: {avg:.2} bytes")?;
        }
        write!(f, "  Efficiency: {:.2}%", self.allocation_efficiency() * 100.0)
    }
}

/// Single-threaded statistics recorder.
///
/// Backed by a [`Cell`], which makes it `!Sync` like the allocators it is
/// meant to sit next to. Use [`AtomicAllocatorStats`] behind shared
/// allocators.
#[derive(Debug, Default)]
pub struct LocalAllocatorStats {
    inner: Cell<AllocatorStats>,
}

impl LocalAllocatorStats {
    /// Creates a zeroed recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self { inner: Cell::new(AllocatorStats::new()) }
    }

    /// Folds one event into the counters.
    pub fn record_event(&self, event: &AllocEvent) {
        let mut stats = self.inner.get();
        stats.record_event(event);
        self.inner.set(stats);
    }

    /// Snapshot of the current numbers.
    #[must_use]
    pub fn snapshot(&self) -> AllocatorStats {
        self.inner.get()
    }

    /// Zeroes the counters.
    pub fn reset(&self) {
        self.inner.set(AllocatorStats::new());
    }
}

impl AllocationObserver for LocalAllocatorStats {
    fn record(&self, event: AllocEvent) {
        self.record_event(&event);
    }
}

/// Thread-safe statistics recorder over relaxed atomics.
///
/// Individual counters are exact; a [`snapshot`](AtomicAllocatorStats::snapshot)
/// taken during concurrent activity may mix values from slightly different
/// moments.
#[derive(Debug, Default)]
pub struct AtomicAllocatorStats {
    allocated_bytes: AtomicUsize,
    peak_allocated_bytes: AtomicUsize,
    allocation_count: AtomicUsize,
    deallocation_count: AtomicUsize,
    reallocation_count: AtomicUsize,
    failed_allocations: AtomicUsize,
    total_bytes_allocated: AtomicUsize,
    total_bytes_deallocated: AtomicUsize,
}

impl AtomicAllocatorStats {
    /// Creates a zeroed recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            allocated_bytes: AtomicUsize::new(0),
            peak_allocated_bytes: AtomicUsize::new(0),
            allocation_count: AtomicUsize::new(0),
            deallocation_count: AtomicUsize::new(0),
            reallocation_count: AtomicUsize::new(0),
            failed_allocations: AtomicUsize::new(0),
            total_bytes_allocated: AtomicUsize::new(0),
            total_bytes_deallocated: AtomicUsize::new(0),
        }
    }

    /// Folds one event into the counters.
    pub fn record_event(&self, event: &AllocEvent) {
        match *event {
            AllocEvent::Allocate { layout, succeeded, .. } => {
                if succeeded {
                    self.record_allocation(layout.size());
                } else {
                    self.failed_allocations.fetch_add(1, Ordering::Relaxed);
                }
            }
            AllocEvent::Grow { old_layout, new_layout, succeeded, .. }
            | AllocEvent::Shrink { old_layout, new_layout, succeeded, .. } => {
                if succeeded {
                    self.record_reallocation(old_layout.size(), new_layout.size());
                } else {
                    self.failed_allocations.fetch_add(1, Ordering::Relaxed);
                }
            }
            AllocEvent::Deallocate { layout } => self.record_deallocation(layout.size()),
            AllocEvent::OwnsQuery { .. } => {}
        }
    }

    fn record_allocation(&self, size: usize) {
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
        self.total_bytes_allocated.fetch_add(size, Ordering::Relaxed);
        let allocated = self.saturating_add_allocated(size);
        atomic_max(&self.peak_allocated_bytes, allocated);
    }

    fn record_deallocation(&self, size: usize) {
        self.deallocation_count.fetch_add(1, Ordering::Relaxed);
        self.total_bytes_deallocated.fetch_add(size, Ordering::Relaxed);
        self.saturating_sub_allocated(size);
    }

    fn record_reallocation(&self, old_size: usize, new_size: usize) {
        self.reallocation_count.fetch_add(1, Ordering::Relaxed);
        if new_size > old_size {
            let diff = new_size - old_size;
            self.total_bytes_allocated.fetch_add(diff, Ordering::Relaxed);
            let allocated = self.saturating_add_allocated(diff);
            atomic_max(&self.peak_allocated_bytes, allocated);
        } else {
            let diff = old_size - new_size;
            self.total_bytes_deallocated.fetch_add(diff, Ordering::Relaxed);
            self.saturating_sub_allocated(diff);
        }
    }

    fn saturating_add_allocated(&self, size: usize) -> usize {
        let mut current = self.allocated_bytes.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_add(size);
            match self.allocated_bytes.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }

    fn saturating_sub_allocated(&self, size: usize) {
        let mut current = self.allocated_bytes.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_sub(size);
            match self.allocated_bytes.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Snapshot of the current numbers.
    #[must_use]
    pub fn snapshot(&self) -> AllocatorStats {
        AllocatorStats {
            allocated_bytes: self.allocated_bytes.load(Ordering::Relaxed),
            peak_allocated_bytes: self.peak_allocated_bytes.load(Ordering::Relaxed),
            allocation_count: self.allocation_count.load(Ordering::Relaxed),
            deallocation_count: self.deallocation_count.load(Ordering::Relaxed),
            reallocation_count: self.reallocation_count.load(Ordering::Relaxed),
            failed_allocations: self.failed_allocations.load(Ordering::Relaxed),
            total_bytes_allocated: self.total_bytes_allocated.load(Ordering::Relaxed),
            total_bytes_deallocated: self.total_bytes_deallocated.load(Ordering::Relaxed),
        }
    }

    /// Zeroes the counters.
    pub fn reset(&self) {
        self.allocated_bytes.store(0, Ordering::Relaxed);
        self.peak_allocated_bytes.store(0, Ordering::Relaxed);
        self.allocation_count.store(0, Ordering::Relaxed);
        self.deallocation_count.store(0, Ordering::Relaxed);
        self.reallocation_count.store(0, Ordering::Relaxed);
        self.failed_allocations.store(0, Ordering::Relaxed);
        self.total_bytes_allocated.store(0, Ordering::Relaxed);
        self.total_bytes_deallocated.store(0, Ordering::Relaxed);
    }
}

impl AllocationObserver for AtomicAllocatorStats {
    fn record(&self, event: AllocEvent) {
        self.record_event(&event);
    }
}

#[cfg(test)]
mod tests {
    use core::alloc::Layout;

    use super::*;

    fn ok_allocate(size: usize) -> AllocEvent {
        AllocEvent::Allocate {
            layout: Layout::from_size_align(size, 8).unwrap(),
            zeroed: false,
            succeeded: true,
        }
    }

    fn deallocate(size: usize) -> AllocEvent {
        AllocEvent::Deallocate { layout: Layout::from_size_align(size, 8).unwrap() }
    }

    #[test]
    fn test_atomic_counts_allocations() {
        let stats = AtomicAllocatorStats::new();
        stats.record_event(&ok_allocate(64));
        stats.record_event(&ok_allocate(32));
        stats.record_event(&deallocate(64));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.allocation_count, 2);
        assert_eq!(snapshot.deallocation_count, 1);
        assert_eq!(snapshot.allocated_bytes, 32);
        assert_eq!(snapshot.peak_allocated_bytes, 96);
        assert_eq!(snapshot.total_bytes_allocated, 96);
        assert_eq!(snapshot.total_bytes_deallocated, 64);
        assert_eq!(snapshot.outstanding_allocations(), 1);
    }

    #[test]
    fn test_reallocation_applies_deltas() {
        let stats = AtomicAllocatorStats::new();
        stats.record_event(&ok_allocate(16));
        stats.record_event(&AllocEvent::Grow {
            old_layout: Layout::from_size_align(16, 8).unwrap(),
            new_layout: Layout::from_size_align(64, 8).unwrap(),
            succeeded: true,
            in_place: true,
        });

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.reallocation_count, 1);
        assert_eq!(snapshot.allocated_bytes, 64);
        assert_eq!(snapshot.total_bytes_allocated, 64);

        stats.record_event(&AllocEvent::Shrink {
            old_layout: Layout::from_size_align(64, 8).unwrap(),
            new_layout: Layout::from_size_align(8, 8).unwrap(),
            succeeded: true,
            in_place: true,
        });
        assert_eq!(stats.snapshot().allocated_bytes, 8);
        assert_eq!(stats.snapshot().total_bytes_deallocated, 56);
    }

    #[test]
    fn test_failures_counted_separately() {
        let stats = LocalAllocatorStats::new();
        stats.record_event(&AllocEvent::Allocate {
            layout: Layout::from_size_align(1024, 8).unwrap(),
            zeroed: false,
            succeeded: false,
        });

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.failed_allocations, 1);
        assert_eq!(snapshot.allocation_count, 0);
        assert_eq!(snapshot.allocated_bytes, 0);
        assert!((snapshot.allocation_efficiency() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unmatched_deallocation_saturates() {
        let stats = AtomicAllocatorStats::new();
        stats.record_event(&deallocate(128));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.allocated_bytes, 0);
        assert_eq!(snapshot.deallocation_count, 1);
    }

    #[test]
    fn test_local_reset() {
        let stats = LocalAllocatorStats::new();
        stats.record_event(&ok_allocate(64));
        assert!(stats.snapshot().has_leaks());

        stats.reset();
        assert_eq!(stats.snapshot(), AllocatorStats::new());
        assert!(!stats.snapshot().has_leaks());
    }

    #[test]
    fn test_owns_queries_do_not_count() {
        let stats = LocalAllocatorStats::new();
        stats.record_event(&AllocEvent::OwnsQuery { owned: true });
        assert_eq!(stats.snapshot(), AllocatorStats::new());
    }

    #[test]
    fn test_display_renders_counters() {
        let stats = LocalAllocatorStats::new();
        stats.record_event(&ok_allocate(50));
        stats.record_event(&ok_allocate(150));

        let rendered = stats.snapshot().to_string();
        assert!(rendered.contains("Allocations: 2"));
        assert!(rendered.contains("Average allocation size: 100.00 bytes"));
    }

    #[test]
    fn test_average_of_nothing_is_none() {
        assert_eq!(AllocatorStats::new().average_allocation_size(), None);
    }
}
