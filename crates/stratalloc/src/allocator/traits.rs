//! Core allocator traits.
//!
//! The composition model is one capability, many small orthogonal traits:
//!
//! - [`Allocator`]: allocate / deallocate / grow / shrink over
//!   [`Layout`], returning [`NonNull<[u8]>`] blocks
//! - [`Owns`]: ownership queries, the routing primitive for composites
//! - [`ThreadSafeAllocator`]: marker for allocators that may be shared
//!   across threads
//! - [`MemoryUsage`] / [`Resettable`]: capacity reporting and arena-style
//!   bulk release
//!
//! Components nest by value (`FallbackAllocator<PoolAllocator<BumpAllocator,
//! 64>, SystemAllocator>`), so every composite monomorphizes to direct calls
//! with no dispatch on the allocation path.
//!
//! # Safety
//!
//! `Allocator` and `ThreadSafeAllocator` are unsafe traits. Implementors
//! must guarantee:
//! - returned pointers are valid, exclusive, and aligned to the request
//! - `deallocate`/`grow`/`shrink` are only sound for blocks this allocator
//!   issued, described by their current layout
//! - the default `grow`/`shrink` relocation copies stay within the sizes
//!   both layouts describe
//!
//! Blanket impls for `&A` only forward; they introduce no new obligations.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::error::AllocResult;

/// Memory allocation capability.
///
/// Methods take `&self`; single-threaded implementations use interior
/// mutability (`Cell`) and are therefore `!Sync`, which makes cross-thread
/// misuse a compile error rather than a runtime hazard.
///
/// # Safety
///
/// Implementors must return pointers that are valid for reads and writes of
/// the returned slice length, aligned to `layout.align()`, and not aliased
/// by any other live allocation. Callers must only pass blocks back to the
/// allocator that issued them, described by their current layout.
pub unsafe trait Allocator {
    /// Allocates memory for `layout`.
    ///
    /// The returned slice is at least `layout.size()` bytes; fixed-size
    /// components may return more (the full block). Contents are
    /// uninitialized.
    ///
    /// # Safety
    /// The returned block is only valid while `self` is alive and must be
    /// released through this allocator.
    ///
    /// # Errors
    /// `OutOfMemory` when the request cannot be satisfied, or a
    /// component-specific error (`Unsupported`, `InvalidAlignment`).
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>>;

    /// Allocates zero-filled memory for `layout`.
    ///
    /// # Safety
    /// Same contract as [`allocate`](Allocator::allocate).
    ///
    /// # Errors
    /// Same as [`allocate`](Allocator::allocate).
    unsafe fn allocate_zeroed(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: Forwarding the caller's contract to allocate.
        let block = unsafe { self.allocate(layout)? };
        // SAFETY: The block was just allocated and is valid for writes of
        // its full returned length (which may exceed layout.size()).
        unsafe { core::ptr::write_bytes(block.cast::<u8>().as_ptr(), 0, block.len()) };
        Ok(block)
    }

    /// Deallocates a block.
    ///
    /// # Safety
    /// - `ptr` must have been issued by this allocator
    /// - `layout` must be the block's current layout
    /// - the block must not be used afterwards; double-free is undefined
    ///   behavior
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Extends an allocation to `new_layout`.
    ///
    /// The default implementation relocates: allocate, copy, deallocate.
    /// Components with in-place paths override it.
    ///
    /// # Safety
    /// - `ptr`/`old_layout` describe a live block issued by this allocator
    /// - `new_layout.size() >= old_layout.size()`
    /// - on success the old pointer is invalid (the block may have moved)
    /// - on failure the block is untouched and stays valid for `old_layout`
    ///
    /// # Errors
    /// `OutOfMemory` if the larger block cannot be provided; `Unsupported`
    /// where the component cannot grow by construction.
    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        debug_assert!(new_layout.size() >= old_layout.size());

        // SAFETY: new_layout is a valid layout; allocate returns a distinct
        // block or an error.
        let new_block = unsafe { self.allocate(new_layout)? };

        // SAFETY:
        // - ptr is valid for reads of old_layout.size() bytes (caller contract)
        // - new_block was just allocated for at least new_layout.size() >=
        //   old_layout.size() bytes and does not overlap the old block
        unsafe {
            core::ptr::copy_nonoverlapping(
                ptr.as_ptr(),
                new_block.cast::<u8>().as_ptr(),
                old_layout.size(),
            );
        }

        // SAFETY: ptr/old_layout describe the original allocation (caller
        // contract); its contents have been copied out.
        unsafe { self.deallocate(ptr, old_layout) };
        Ok(new_block)
    }

    /// Shrinks an allocation to `new_layout`.
    ///
    /// The default narrows in place when the alignment allows it and
    /// relocates otherwise.
    ///
    /// # Safety
    /// - `ptr`/`old_layout` describe a live block issued by this allocator
    /// - `new_layout.size() <= old_layout.size()`
    /// - on success the old pointer is invalid if the block moved
    /// - on failure the block is untouched and stays valid for `old_layout`
    ///
    /// # Errors
    /// Component-specific; the default only fails if a relocation for
    /// stricter alignment fails.
    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        debug_assert!(new_layout.size() <= old_layout.size());

        if new_layout.align() <= old_layout.align() {
            return Ok(NonNull::slice_from_raw_parts(ptr, new_layout.size()));
        }

        // Stricter alignment: the current address may not satisfy it, so
        // relocate. Not expressible via the grow default (sizes move the
        // other way), hence the inline copy.
        // SAFETY: as in the grow default, with new_layout.size() bytes
        // copied (the surviving prefix of the block).
        let new_block = unsafe { self.allocate(new_layout)? };
        unsafe {
            core::ptr::copy_nonoverlapping(
                ptr.as_ptr(),
                new_block.cast::<u8>().as_ptr(),
                new_layout.size(),
            );
        }
        unsafe { self.deallocate(ptr, old_layout) };
        Ok(new_block)
    }

    /// Dispatches to `grow`/`shrink` based on the size relation.
    ///
    /// # Safety
    /// Union of the [`grow`](Allocator::grow) and
    /// [`shrink`](Allocator::shrink) contracts, without their size-direction
    /// requirements.
    ///
    /// # Errors
    /// Whatever the dispatched operation returns.
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        if old_layout.size() == new_layout.size() && new_layout.align() <= old_layout.align() {
            return Ok(NonNull::slice_from_raw_parts(ptr, new_layout.size()));
        }

        if new_layout.size() >= old_layout.size() {
            // SAFETY: caller contract plus the checked size direction.
            unsafe { self.grow(ptr, old_layout, new_layout) }
        } else {
            // SAFETY: caller contract plus the checked size direction.
            unsafe { self.shrink(ptr, old_layout, new_layout) }
        }
    }

    /// Largest single allocation this allocator can ever satisfy.
    fn max_allocation_size(&self) -> usize {
        isize::MAX as usize
    }

    /// Whether zero-sized requests are served (with a dangling block).
    fn supports_zero_sized_allocations(&self) -> bool {
        true
    }
}

/// Ownership query: does this allocator manage the given block?
///
/// Composites route `deallocate`/`grow`/`shrink` by asking their children
/// `owns` rather than remembering which child issued a block, so a block may
/// be handed to the composite that (transitively) allocated it without any
/// bookkeeping on the caller's side.
///
/// `owns` mirrors `deallocate`'s parameter shape. The layout matters:
/// affix-style wrappers need the payload alignment to recompute the
/// underlying block. Implementations must answer from exact state (address
/// ranges they control, live-slab sets), never by guessing.
pub trait Owns {
    /// Returns `true` if `ptr`/`layout` describe a live block issued by this
    /// allocator.
    fn owns(&self, ptr: NonNull<u8>, layout: Layout) -> bool;
}

/// Marker for allocators that are safe to share across threads.
///
/// # Safety
///
/// Implementors must guarantee that concurrent calls from multiple threads
/// are free of data races. Single-threaded components (`BumpAllocator`,
/// `PoolAllocator`, `LocalTrackedAllocator`) are `!Sync` and can never
/// implement this.
pub unsafe trait ThreadSafeAllocator: Allocator + Send + Sync {}

/// Memory usage reporting.
pub trait MemoryUsage {
    /// Currently used memory in bytes.
    fn used_memory(&self) -> usize;

    /// Available memory in bytes, if known.
    fn available_memory(&self) -> Option<usize>;

    /// Total capacity in bytes, if known.
    fn total_memory(&self) -> Option<usize> {
        self.available_memory().map(|available| self.used_memory() + available)
    }

    /// Usage as a percentage of total capacity, if known.
    fn memory_usage_percent(&self) -> Option<f32> {
        self.total_memory().map(|total| {
            if total == 0 {
                0.0
            } else {
                (self.used_memory() as f32 / total as f32) * 100.0
            }
        })
    }

    /// Snapshot of the usage numbers.
    fn memory_usage(&self) -> BasicMemoryUsage {
        BasicMemoryUsage {
            used: self.used_memory(),
            available: self.available_memory(),
            total: self.total_memory(),
            usage_percent: self.memory_usage_percent(),
        }
    }
}

/// Point-in-time memory usage numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasicMemoryUsage {
    /// Currently used memory in bytes.
    pub used: usize,
    /// Available memory in bytes (`None` if unbounded or unknown).
    pub available: Option<usize>,
    /// Total capacity in bytes (`None` if unbounded or unknown).
    pub total: Option<usize>,
    /// Usage percentage (`None` if it cannot be computed).
    pub usage_percent: Option<f32>,
}

impl core::fmt::Display for BasicMemoryUsage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "used: {} bytes", self.used)?;
        if let Some(total) = self.total {
            write!(f, ", total: {total} bytes")?;
        }
        if let Some(percent) = self.usage_percent {
            write!(f, " ({percent:.1}%)")?;
        }
        Ok(())
    }
}

/// Bulk release back to the initial state.
pub trait Resettable {
    /// Resets the allocator, reclaiming every outstanding block at once.
    ///
    /// # Safety
    /// All blocks issued before the reset become invalid immediately; the
    /// caller must ensure none are used afterwards.
    unsafe fn reset(&self);

    /// Whether reset is currently safe to perform.
    fn can_reset(&self) -> bool {
        true
    }

    /// Resets only if [`can_reset`](Resettable::can_reset) allows it.
    ///
    /// Returns `true` if the reset was performed.
    ///
    /// # Safety
    /// Same as [`reset`](Resettable::reset) when the reset happens.
    unsafe fn try_reset(&self) -> bool {
        if self.can_reset() {
            // SAFETY: forwarded caller contract.
            unsafe { self.reset() };
            true
        } else {
            false
        }
    }
}

// SAFETY: Forwarding every method to the underlying allocator preserves its
// contracts; no new unsafe operations are introduced.
unsafe impl<A: Allocator + ?Sized> Allocator for &A {
    #[inline]
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).allocate(layout) }
    }

    #[inline]
    unsafe fn allocate_zeroed(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).allocate_zeroed(layout) }
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).deallocate(ptr, layout) }
    }

    #[inline]
    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).grow(ptr, old_layout, new_layout) }
    }

    #[inline]
    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).shrink(ptr, old_layout, new_layout) }
    }

    #[inline]
    fn max_allocation_size(&self) -> usize {
        (**self).max_allocation_size()
    }

    #[inline]
    fn supports_zero_sized_allocations(&self) -> bool {
        (**self).supports_zero_sized_allocations()
    }
}

impl<A: Owns + ?Sized> Owns for &A {
    #[inline]
    fn owns(&self, ptr: NonNull<u8>, layout: Layout) -> bool {
        (**self).owns(ptr, layout)
    }
}
