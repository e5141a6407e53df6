//! Primary/secondary composition with ownership-routed frees.

use core::alloc::Layout;
use core::ptr::NonNull;

#[cfg(feature = "logging")]
use tracing::debug;

use crate::allocator::traits::{Allocator, MemoryUsage, Owns, Resettable, ThreadSafeAllocator};
use crate::error::AllocResult;

/// Tries the primary allocator first and falls back to the secondary on any
/// failure.
///
/// The primary must implement [`Owns`]: frees and resizes are routed by
/// asking it, so the caller never has to remember which side served a
/// block. The secondary needs no ownership query, which is what lets the
/// process heap ([`SystemAllocator`](crate::allocator::SystemAllocator))
/// sit there.
///
/// `grow` adds one extra move: when the primary owns the block but cannot
/// extend it, the block migrates to the secondary (allocate, copy, free the
/// primary block). A bump-backed primary refuses interior growth, so
/// without migration any non-tail block would be stuck at its size. If the
/// secondary cannot allocate either, the error is returned and the
/// original block stays valid in the primary.
#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackAllocator<P, S> {
    primary: P,
    secondary: S,
}

impl<P, S> FallbackAllocator<P, S> {
    /// Creates a fallback composition.
    pub const fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }

    /// The preferred allocator.
    pub const fn primary(&self) -> &P {
        &self.primary
    }

    /// The allocator used when the primary fails.
    pub const fn secondary(&self) -> &S {
        &self.secondary
    }

    /// Consumes the composition and returns both members.
    pub fn into_parts(self) -> (P, S) {
        (self.primary, self.secondary)
    }
}

// SAFETY: Every block is issued by exactly one of the two members, and the
// primary's Owns impl identifies which, so deallocate/grow/shrink always
// reach the member that issued the block.
unsafe impl<P, S> Allocator for FallbackAllocator<P, S>
where
    P: Allocator + Owns,
    S: Allocator,
{
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: forwarded caller contract.
        match unsafe { self.primary.allocate(layout) } {
            Ok(block) => Ok(block),
            // SAFETY: forwarded caller contract.
            Err(_) => unsafe { self.secondary.allocate(layout) },
        }
    }

    unsafe fn allocate_zeroed(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: forwarded caller contract.
        match unsafe { self.primary.allocate_zeroed(layout) } {
            Ok(block) => Ok(block),
            // SAFETY: forwarded caller contract.
            Err(_) => unsafe { self.secondary.allocate_zeroed(layout) },
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if self.primary.owns(ptr, layout) {
            // SAFETY: the primary issued this block.
            unsafe { self.primary.deallocate(ptr, layout) };
        } else {
            // SAFETY: a block not owned by the primary came from the
            // secondary (allocate only uses these two sources).
            unsafe { self.secondary.deallocate(ptr, layout) };
        }
    }

    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        if !self.primary.owns(ptr, old_layout) {
            // SAFETY: secondary-issued block, forwarded contract.
            return unsafe { self.secondary.grow(ptr, old_layout, new_layout) };
        }

        // SAFETY: primary-issued block, forwarded contract.
        if let Ok(block) = unsafe { self.primary.grow(ptr, old_layout, new_layout) } {
            return Ok(block);
        }

        // The primary cannot extend this block; move it to the secondary.
        // SAFETY: on failure the original block is untouched and the error
        // propagates.
        let new_block = unsafe { self.secondary.allocate(new_layout)? };

        #[cfg(feature = "logging")]
        debug!(
            old_size = old_layout.size(),
            new_size = new_layout.size(),
            "migrating block from primary to secondary"
        );

        // SAFETY:
        // - ptr is valid for reads of old_layout.size() bytes (caller
        //   contract)
        // - new_block is a fresh secondary allocation of at least
        //   new_layout.size() >= old_layout.size() bytes
        unsafe {
            core::ptr::copy_nonoverlapping(
                ptr.as_ptr(),
                new_block.cast::<u8>().as_ptr(),
                old_layout.size(),
            );
            self.primary.deallocate(ptr, old_layout);
        }
        Ok(new_block)
    }

    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        if self.primary.owns(ptr, old_layout) {
            // SAFETY: primary-issued block, forwarded contract.
            unsafe { self.primary.shrink(ptr, old_layout, new_layout) }
        } else {
            // SAFETY: secondary-issued block, forwarded contract.
            unsafe { self.secondary.shrink(ptr, old_layout, new_layout) }
        }
    }

    fn max_allocation_size(&self) -> usize {
        self.primary.max_allocation_size().max(self.secondary.max_allocation_size())
    }

    fn supports_zero_sized_allocations(&self) -> bool {
        self.primary.supports_zero_sized_allocations()
            || self.secondary.supports_zero_sized_allocations()
    }
}

impl<P: Owns, S: Owns> Owns for FallbackAllocator<P, S> {
    fn owns(&self, ptr: NonNull<u8>, layout: Layout) -> bool {
        self.primary.owns(ptr, layout) || self.secondary.owns(ptr, layout)
    }
}

impl<P: MemoryUsage, S: MemoryUsage> MemoryUsage for FallbackAllocator<P, S> {
    fn used_memory(&self) -> usize {
        self.primary.used_memory() + self.secondary.used_memory()
    }

    fn available_memory(&self) -> Option<usize> {
        Some(self.primary.available_memory()? + self.secondary.available_memory()?)
    }
}

impl<P: Resettable, S: Resettable> Resettable for FallbackAllocator<P, S> {
    unsafe fn reset(&self) {
        // SAFETY: forwarded caller contract, applied to both members.
        unsafe {
            self.primary.reset();
            self.secondary.reset();
        }
    }

    fn can_reset(&self) -> bool {
        self.primary.can_reset() && self.secondary.can_reset()
    }
}

// SAFETY: Both members are thread-safe and the composition adds no state of
// its own.
unsafe impl<P, S> ThreadSafeAllocator for FallbackAllocator<P, S>
where
    P: ThreadSafeAllocator + Owns,
    S: ThreadSafeAllocator,
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{BumpAllocator, NullAllocator, SystemAllocator};
    use crate::error::AllocError;

    fn bump_with_system(capacity: usize) -> FallbackAllocator<BumpAllocator, SystemAllocator> {
        FallbackAllocator::new(BumpAllocator::new(capacity).unwrap(), SystemAllocator::new())
    }

    #[test]
    fn test_primary_preferred() {
        let fallback = bump_with_system(256);
        let layout = Layout::from_size_align(64, 8).unwrap();

        unsafe {
            let block = fallback.allocate(layout).unwrap();
            assert!(fallback.primary().owns(block.cast(), layout));
            fallback.deallocate(block.cast(), layout);
        }
    }

    #[test]
    fn test_spills_to_secondary_when_primary_full() {
        let fallback = bump_with_system(128);
        let layout = Layout::from_size_align(64, 8).unwrap();

        unsafe {
            let a = fallback.allocate(layout).unwrap();
            let b = fallback.allocate(layout).unwrap();
            let spilled = fallback.allocate(layout).unwrap();

            assert!(fallback.primary().owns(a.cast(), layout));
            assert!(fallback.primary().owns(b.cast(), layout));
            assert!(!fallback.primary().owns(spilled.cast(), layout));

            fallback.deallocate(spilled.cast(), layout);
            fallback.deallocate(b.cast(), layout);
            fallback.deallocate(a.cast(), layout);
        }
    }

    #[test]
    fn test_deallocate_routes_by_ownership() {
        let fallback = bump_with_system(64);
        let layout = Layout::from_size_align(64, 8).unwrap();

        unsafe {
            let primary_block = fallback.allocate(layout).unwrap();
            let spilled = fallback.allocate(layout).unwrap();
            assert_eq!(fallback.primary().used(), 64);

            // Freeing the spilled block must not touch the bump cursor.
            fallback.deallocate(spilled.cast(), layout);
            assert_eq!(fallback.primary().used(), 64);

            fallback.deallocate(primary_block.cast(), layout);
            assert_eq!(fallback.primary().used(), 0);
        }
    }

    #[test]
    fn test_both_failing_reports_error() {
        let fallback =
            FallbackAllocator::new(BumpAllocator::new(32).unwrap(), NullAllocator::new());
        let layout = Layout::from_size_align(64, 8).unwrap();

        let result = unsafe { fallback.allocate(layout) };
        assert!(matches!(result, Err(AllocError::OutOfMemory { .. })));
    }

    #[test]
    fn test_grow_migrates_interior_block() {
        let fallback = bump_with_system(128);
        let old = Layout::from_size_align(64, 8).unwrap();
        let new = Layout::from_size_align(128, 8).unwrap();

        unsafe {
            let a = fallback.allocate(old).unwrap();
            let _b = fallback.allocate(Layout::from_size_align(32, 8).unwrap()).unwrap();
            a.cast::<u8>().as_ptr().write_bytes(0x42, 64);

            // `a` is interior now, so the bump refuses to extend it and the
            // block moves to the system heap.
            let grown = fallback.grow(a.cast(), old, new).unwrap();
            assert!(!fallback.primary().owns(grown.cast(), new));
            assert_eq!(*grown.cast::<u8>().as_ptr(), 0x42);
            assert_eq!(*grown.cast::<u8>().as_ptr().add(63), 0x42);

            let bump_used = fallback.primary().used();
            fallback.deallocate(grown.cast(), new);
            assert_eq!(fallback.primary().used(), bump_used);
        }
    }

    #[test]
    fn test_grow_migration_failure_keeps_block() {
        let fallback =
            FallbackAllocator::new(BumpAllocator::new(128).unwrap(), NullAllocator::new());
        let old = Layout::from_size_align(64, 8).unwrap();
        let new = Layout::from_size_align(256, 8).unwrap();

        unsafe {
            let a = fallback.allocate(old).unwrap();
            let _b = fallback.allocate(Layout::from_size_align(32, 8).unwrap()).unwrap();
            a.cast::<u8>().as_ptr().write_bytes(0x7C, 64);

            let result = fallback.grow(a.cast(), old, new);
            assert!(result.is_err());

            // The original block is still live and intact.
            assert!(fallback.primary().owns(a.cast(), old));
            assert_eq!(*a.cast::<u8>().as_ptr().add(63), 0x7C);
        }
    }

    #[test]
    fn test_tail_grow_stays_in_primary() {
        let fallback = bump_with_system(256);
        let old = Layout::from_size_align(64, 8).unwrap();
        let new = Layout::from_size_align(128, 8).unwrap();

        unsafe {
            let block = fallback.allocate(old).unwrap();
            let grown = fallback.grow(block.cast(), old, new).unwrap();

            assert_eq!(grown.cast::<u8>(), block.cast::<u8>());
            assert!(fallback.primary().owns(grown.cast(), new));
        }
    }

    #[test]
    fn test_usage_sums_members() {
        let fallback = FallbackAllocator::new(
            BumpAllocator::new(128).unwrap(),
            BumpAllocator::new(64).unwrap(),
        );
        let layout = Layout::from_size_align(96, 8).unwrap();

        unsafe {
            let _spill_sized = fallback.allocate(layout).unwrap();
        }

        assert_eq!(fallback.used_memory(), 96);
        assert_eq!(fallback.available_memory(), Some(96));
        assert_eq!(fallback.total_memory(), Some(192));
    }
}
