//! Composable building blocks for low-level memory allocation
//!
//! This crate provides a small vocabulary of allocators that compose into
//! application-specific allocation policies, including:
//!
//! - Leaf allocators: the process heap ([`SystemAllocator`]), fixed-capacity
//!   bump arenas ([`BumpAllocator`]) and the always-failing [`NullAllocator`]
//! - Slab recycling over any backing allocator ([`PoolAllocator`])
//! - Policy combinators: primary-with-fallback ([`FallbackAllocator`]) and
//!   size-class routing ([`SegregateAllocator`])
//! - Diagnostics: guard bytes around every block ([`AffixAllocator`]), event
//!   observers ([`ProxyAllocator`]) and allocation statistics with filtering
//!   ([`TrackedAllocator`])
//!
//! Composition happens at the type level, so a stack like "64-byte slabs
//! carved from a bump arena, spilling to the process heap when the arena
//! fills, with statistics on top" is one concrete type with no virtual
//! dispatch.
//!
//! # Example
//!
//! ```
//! use core::alloc::Layout;
//! use stratalloc::allocator::{
//!     Allocator, BumpAllocator, FallbackAllocator, PoolAllocator, SystemAllocator, TrackExt,
//! };
//!
//! fn main() -> stratalloc::AllocResult<()> {
//!     let arena = BumpAllocator::new(4096)?;
//!     let stack =
//!         FallbackAllocator::new(PoolAllocator::<_, 64>::new(arena)?, SystemAllocator::new())
//!             .with_tracking();
//!
//!     let layout = Layout::from_size_align(48, 8).unwrap();
//!     let block = unsafe { stack.allocate(layout)? };
//!     unsafe { stack.deallocate(block.cast(), layout) };
//!
//!     assert!(!stack.has_leaks());
//!     Ok(())
//! }
//! ```
//!
//! # Thread safety
//!
//! Allocators that are safe to share implement the
//! [`ThreadSafeAllocator`](allocator::ThreadSafeAllocator) marker. Components
//! built on unsynchronized interior mutability (bump arenas, slab pools, the
//! event log) do not, and sharing one across threads fails to compile. A
//! combinator is thread-safe exactly when everything inside it is.
//!
//! # Features
//!
//! - `logging` (default): emit `tracing` events for integrity violations,
//!   fallback spills and other notable transitions
//!
//! [`SystemAllocator`]: allocator::SystemAllocator
//! [`BumpAllocator`]: allocator::BumpAllocator
//! [`NullAllocator`]: allocator::NullAllocator
//! [`PoolAllocator`]: allocator::PoolAllocator
//! [`FallbackAllocator`]: allocator::FallbackAllocator
//! [`SegregateAllocator`]: allocator::SegregateAllocator
//! [`AffixAllocator`]: allocator::AffixAllocator
//! [`ProxyAllocator`]: allocator::ProxyAllocator
//! [`TrackedAllocator`]: allocator::TrackedAllocator

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![allow(unsafe_code)]

pub mod allocator;
pub mod error;
pub mod utils;

// Re-export common types for convenience
pub use error::{AllocError, AllocResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::allocator::{
        Allocator, MemoryUsage, Owns, Resettable, StatisticsProvider, ThreadSafeAllocator,
        TrackExt,
    };
    pub use crate::allocator::{
        AffixAllocator, BumpAllocator, FallbackAllocator, NullAllocator, PoolAllocator,
        ProxyAllocator, SegregateAllocator, SystemAllocator, TrackedAllocator,
    };
    pub use crate::error::{AllocError, AllocResult};
}
