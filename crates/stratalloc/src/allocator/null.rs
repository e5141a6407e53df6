//! Allocator that always fails.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::allocator::traits::{Allocator, MemoryUsage, Owns, ThreadSafeAllocator};
use crate::error::{AllocError, AllocResult};

/// Allocator that refuses every request.
///
/// Useful as the terminal member of a composite: a
/// `FallbackAllocator<PoolAllocator<_, 64>, NullAllocator>` turns the pool
/// into a hard-capped allocator, and a `NullAllocator` under a
/// `TrackedAllocator` counts requests that leak past the layers above it.
///
/// `owns` is always `false` and `deallocate` is a no-op, so composites that
/// route by ownership treat it as owning nothing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NullAllocator;

impl NullAllocator {
    /// Creates a null allocator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

// SAFETY: No memory is ever produced, so there are no pointer contracts to
// uphold; deallocate ignores its input.
unsafe impl Allocator for NullAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        Err(AllocError::OutOfMemory { size: layout.size(), align: layout.align() })
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {}

    unsafe fn grow(
        &self,
        _ptr: NonNull<u8>,
        _old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        Err(AllocError::OutOfMemory { size: new_layout.size(), align: new_layout.align() })
    }

    unsafe fn shrink(
        &self,
        _ptr: NonNull<u8>,
        _old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        Err(AllocError::OutOfMemory { size: new_layout.size(), align: new_layout.align() })
    }

    fn max_allocation_size(&self) -> usize {
        0
    }

    fn supports_zero_sized_allocations(&self) -> bool {
        false
    }
}

impl Owns for NullAllocator {
    fn owns(&self, _ptr: NonNull<u8>, _layout: Layout) -> bool {
        false
    }
}

impl MemoryUsage for NullAllocator {
    fn used_memory(&self) -> usize {
        0
    }

    fn available_memory(&self) -> Option<usize> {
        Some(0)
    }
}

// SAFETY: Stateless; concurrent calls touch no shared data.
unsafe impl ThreadSafeAllocator for NullAllocator {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_always_fails() {
        let allocator = NullAllocator::new();
        let layout = Layout::from_size_align(64, 8).unwrap();

        let result = unsafe { allocator.allocate(layout) };
        assert!(matches!(result, Err(AllocError::OutOfMemory { size: 64, align: 8 })));

        let zeroed = unsafe { allocator.allocate_zeroed(layout) };
        assert!(zeroed.is_err());
    }

    #[test]
    fn test_zero_sized_request_fails() {
        let allocator = NullAllocator::new();
        let layout = Layout::from_size_align(0, 1).unwrap();

        assert!(unsafe { allocator.allocate(layout) }.is_err());
        assert!(!allocator.supports_zero_sized_allocations());
    }

    #[test]
    fn test_deallocate_is_noop() {
        let allocator = NullAllocator::new();
        let layout = Layout::from_size_align(16, 8).unwrap();
        let ptr = NonNull::new(0x1000 as *mut u8).unwrap();

        unsafe { allocator.deallocate(ptr, layout) };
    }

    #[test]
    fn test_owns_nothing() {
        let allocator = NullAllocator::new();
        let layout = Layout::from_size_align(16, 8).unwrap();
        let ptr = NonNull::new(0x1000 as *mut u8).unwrap();

        assert!(!allocator.owns(ptr, layout));
    }

    #[test]
    fn test_usage_reports_empty() {
        let allocator = NullAllocator::new();
        assert_eq!(allocator.used_memory(), 0);
        assert_eq!(allocator.total_memory(), Some(0));
    }
}
