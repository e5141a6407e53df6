//! Size-class splitter over two allocators.

use core::alloc::Layout;
use core::ptr::NonNull;

#[cfg(feature = "logging")]
use tracing::error;

use crate::allocator::traits::{Allocator, MemoryUsage, Owns, Resettable, ThreadSafeAllocator};
use crate::error::{AllocError, AllocResult};
use crate::utils::zero_sized_block;

/// Routes requests of up to `THRESHOLD` bytes to the small allocator and
/// everything larger to the large one.
///
/// New allocations route by requested size, with `THRESHOLD` itself going
/// small. Operations on existing blocks route by ownership instead: a block
/// may legitimately outgrow the threshold in place (a tail block in a
/// bump-backed small class), after which its size says "large" but its
/// memory still belongs to the small member. Both members therefore must
/// implement [`Owns`].
///
/// Blocks never migrate between classes. A resize the owning member cannot
/// do in place fails, and recovering from that (allocate, copy, free) is a
/// caller or [`FallbackAllocator`](crate::allocator::FallbackAllocator)
/// concern. A resize request for a block neither member recognizes is
/// reported as an integrity violation rather than guessed at.
#[derive(Debug, Default, Clone, Copy)]
pub struct SegregateAllocator<S, L, const THRESHOLD: usize> {
    small: S,
    large: L,
}

impl<S, L, const THRESHOLD: usize> SegregateAllocator<S, L, THRESHOLD> {
    /// Creates a segregating composition.
    pub const fn new(small: S, large: L) -> Self {
        Self { small, large }
    }

    /// The allocator serving requests up to the threshold.
    pub const fn small(&self) -> &S {
        &self.small
    }

    /// The allocator serving requests above the threshold.
    pub const fn large(&self) -> &L {
        &self.large
    }

    /// Consumes the composition and returns both members.
    pub fn into_parts(self) -> (S, L) {
        (self.small, self.large)
    }
}

// SAFETY: Allocation routes deterministically by size and later operations
// route by ownership, so every block reaches the member that issued it.
unsafe impl<S, L, const THRESHOLD: usize> Allocator for SegregateAllocator<S, L, THRESHOLD>
where
    S: Allocator + Owns,
    L: Allocator + Owns,
{
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        if layout.size() <= THRESHOLD {
            // SAFETY: forwarded caller contract.
            unsafe { self.small.allocate(layout) }
        } else {
            // SAFETY: forwarded caller contract.
            unsafe { self.large.allocate(layout) }
        }
    }

    unsafe fn allocate_zeroed(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        if layout.size() <= THRESHOLD {
            // SAFETY: forwarded caller contract.
            unsafe { self.small.allocate_zeroed(layout) }
        } else {
            // SAFETY: forwarded caller contract.
            unsafe { self.large.allocate_zeroed(layout) }
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if self.small.owns(ptr, layout) {
            // SAFETY: the small member issued this block.
            unsafe { self.small.deallocate(ptr, layout) };
        } else if self.large.owns(ptr, layout) {
            // SAFETY: the large member issued this block.
            unsafe { self.large.deallocate(ptr, layout) };
        } else if layout.size() != 0 {
            // Zero-sized placeholders are never owned and need no release.
            // Anything else here is a routing breakdown; leak it rather
            // than hand it to the wrong member.
            #[cfg(feature = "logging")]
            error!(
                size = layout.size(),
                align = layout.align(),
                "deallocate of block neither size class owns"
            );
        }
    }

    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        if old_layout.size() == 0 {
            // SAFETY: the old block was a dangling placeholder.
            return unsafe { self.allocate(new_layout) };
        }

        if self.small.owns(ptr, old_layout) {
            // SAFETY: small-member block, forwarded contract.
            unsafe { self.small.grow(ptr, old_layout, new_layout) }
        } else if self.large.owns(ptr, old_layout) {
            // SAFETY: large-member block, forwarded contract.
            unsafe { self.large.grow(ptr, old_layout, new_layout) }
        } else {
            Err(AllocError::integrity_violation(
                "segregate",
                "grow of block neither size class owns",
            ))
        }
    }

    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        if old_layout.size() == 0 {
            return Ok(zero_sized_block(new_layout));
        }

        if self.small.owns(ptr, old_layout) {
            // SAFETY: small-member block, forwarded contract.
            unsafe { self.small.shrink(ptr, old_layout, new_layout) }
        } else if self.large.owns(ptr, old_layout) {
            // SAFETY: large-member block, forwarded contract.
            unsafe { self.large.shrink(ptr, old_layout, new_layout) }
        } else {
            Err(AllocError::integrity_violation(
                "segregate",
                "shrink of block neither size class owns",
            ))
        }
    }

    fn max_allocation_size(&self) -> usize {
        self.small.max_allocation_size().max(self.large.max_allocation_size())
    }

    fn supports_zero_sized_allocations(&self) -> bool {
        self.small.supports_zero_sized_allocations()
    }
}

impl<S: Owns, L: Owns, const THRESHOLD: usize> Owns for SegregateAllocator<S, L, THRESHOLD> {
    fn owns(&self, ptr: NonNull<u8>, layout: Layout) -> bool {
        self.small.owns(ptr, layout) || self.large.owns(ptr, layout)
    }
}

impl<S: MemoryUsage, L: MemoryUsage, const THRESHOLD: usize> MemoryUsage
    for SegregateAllocator<S, L, THRESHOLD>
{
    fn used_memory(&self) -> usize {
        self.small.used_memory() + self.large.used_memory()
    }

    fn available_memory(&self) -> Option<usize> {
        Some(self.small.available_memory()? + self.large.available_memory()?)
    }
}

impl<S: Resettable, L: Resettable, const THRESHOLD: usize> Resettable
    for SegregateAllocator<S, L, THRESHOLD>
{
    unsafe fn reset(&self) {
        // SAFETY: forwarded caller contract, applied to both members.
        unsafe {
            self.small.reset();
            self.large.reset();
        }
    }

    fn can_reset(&self) -> bool {
        self.small.can_reset() && self.large.can_reset()
    }
}

// SAFETY: Both members are thread-safe and the composition adds no state of
// its own.
unsafe impl<S, L, const THRESHOLD: usize> ThreadSafeAllocator
    for SegregateAllocator<S, L, THRESHOLD>
where
    S: ThreadSafeAllocator + Owns,
    L: ThreadSafeAllocator + Owns,
{
}
