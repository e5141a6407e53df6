//! Allocator building blocks and the compositions over them.
//!
//! Leaves ([`BumpAllocator`], [`PoolAllocator`], [`SystemAllocator`],
//! [`NullAllocator`]) own memory; composites ([`FallbackAllocator`],
//! [`SegregateAllocator`]) route between members; wrappers
//! ([`AffixAllocator`], [`ProxyAllocator`], [`TrackedAllocator`]) add
//! behavior to whatever they enclose. All of them meet at the traits in
//! this module, so any piece slots into any position.

mod affix;
mod bump;
mod event;
mod fallback;
mod filters;
mod null;
mod pool;
mod proxy;
mod segregate;
mod stats;
mod system;
mod tracked;
mod traits;

pub use affix::{AffixAllocator, Canary, CorruptionPolicy, GuardPattern};
pub use bump::{BumpAllocator, BumpCheckpoint, BumpScope};
pub use event::AllocEvent;
pub use fallback::FallbackAllocator;
pub use filters::{AllocInitFilter, CountAll, EventFilter, ReallocPlacementFilter, ResultFilter};
pub use null::NullAllocator;
pub use pool::PoolAllocator;
pub use proxy::{AllocationObserver, EventLog, ProxyAllocator};
pub use segregate::SegregateAllocator;
pub use stats::{AllocatorStats, AtomicAllocatorStats, LocalAllocatorStats, StatisticsProvider};
pub use system::SystemAllocator;
pub use tracked::{LocalTrackedAllocator, TrackExt, TrackedAllocator};
pub use traits::{Allocator, BasicMemoryUsage, MemoryUsage, Owns, Resettable, ThreadSafeAllocator};
