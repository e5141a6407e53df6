//! Event predicates for selective tracking.

use crate::allocator::event::AllocEvent;

/// Decides which [`AllocEvent`]s a tracked allocator counts.
///
/// Filters compose with tuples: `(ResultFilter::Failures,
/// AllocInitFilter::Zeroed)` counts only failed zeroed allocations.
pub trait EventFilter {
    /// Whether this event should reach the statistics.
    fn should_count(&self, event: &AllocEvent) -> bool;
}

impl<F: EventFilter + ?Sized> EventFilter for &F {
    fn should_count(&self, event: &AllocEvent) -> bool {
        (**self).should_count(event)
    }
}

impl<F1: EventFilter, F2: EventFilter> EventFilter for (F1, F2) {
    fn should_count(&self, event: &AllocEvent) -> bool {
        self.0.should_count(event) && self.1.should_count(event)
    }
}

/// Counts everything; the default filter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CountAll;

impl EventFilter for CountAll {
    fn should_count(&self, _event: &AllocEvent) -> bool {
        true
    }
}

/// Splits allocations by requested initialization.
///
/// Only [`AllocEvent::Allocate`] is gated; every other kind passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocInitFilter {
    /// Count plain allocations only.
    Uninitialized,
    /// Count zero-initialized allocations only.
    Zeroed,
}

impl EventFilter for AllocInitFilter {
    fn should_count(&self, event: &AllocEvent) -> bool {
        match *event {
            AllocEvent::Allocate { zeroed, .. } => match self {
                Self::Uninitialized => !zeroed,
                Self::Zeroed => zeroed,
            },
            _ => true,
        }
    }
}

/// Splits resizes by whether the block moved.
///
/// Failed resizes have no placement and are dropped by both variants;
/// non-resize events pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReallocPlacementFilter {
    /// Count resizes served without moving the block.
    InPlace,
    /// Count resizes that relocated the block.
    Relocated,
}

impl EventFilter for ReallocPlacementFilter {
    fn should_count(&self, event: &AllocEvent) -> bool {
        match *event {
            AllocEvent::Grow { succeeded, in_place, .. }
            | AllocEvent::Shrink { succeeded, in_place, .. } => {
                succeeded
                    && match self {
                        Self::InPlace => in_place,
                        Self::Relocated => !in_place,
                    }
            }
            _ => true,
        }
    }
}

/// Splits every event by outcome.
///
/// Deallocations and ownership queries cannot fail and count as successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFilter {
    /// Count operations that succeeded.
    Successes,
    /// Count operations that failed.
    Failures,
}

impl EventFilter for ResultFilter {
    fn should_count(&self, event: &AllocEvent) -> bool {
        match self {
            Self::Successes => event.succeeded(),
            Self::Failures => !event.succeeded(),
        }
    }
}
