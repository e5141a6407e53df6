//! System allocator backed by `std::alloc`.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::allocator::traits::{Allocator, ThreadSafeAllocator};
use crate::error::{AllocError, AllocResult};
use crate::utils::zero_sized_block;

/// The process heap, exposed through the [`Allocator`] capability.
///
/// This is the usual general-purpose backstop: the secondary of a
/// [`FallbackAllocator`](crate::allocator::FallbackAllocator), the backing
/// store of a [`PoolAllocator`](crate::allocator::PoolAllocator), the inner
/// allocator of benchmarks and tests.
///
/// It does not implement [`Owns`](crate::allocator::Owns): the process heap
/// cannot answer ownership queries, so it can only sit in composite
/// positions that never ask (the fallback secondary, not the primary).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SystemAllocator;

impl SystemAllocator {
    /// Creates a system allocator handle.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

// SAFETY: All operations delegate to std::alloc, which provides valid,
// exclusive, properly aligned blocks. Zero-sized requests are served with a
// dangling pointer and never reach std::alloc (calling it with a zero-sized
// layout is undefined behavior).
unsafe impl Allocator for SystemAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        if layout.size() == 0 {
            return Ok(zero_sized_block(layout));
        }

        // SAFETY: layout has non-zero size.
        let raw = unsafe { std::alloc::alloc(layout) };
        NonNull::new(raw)
            .map(|ptr| NonNull::slice_from_raw_parts(ptr, layout.size()))
            .ok_or(AllocError::OutOfMemory { size: layout.size(), align: layout.align() })
    }

    unsafe fn allocate_zeroed(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        if layout.size() == 0 {
            return Ok(zero_sized_block(layout));
        }

        // SAFETY: layout has non-zero size.
        let raw = unsafe { std::alloc::alloc_zeroed(layout) };
        NonNull::new(raw)
            .map(|ptr| NonNull::slice_from_raw_parts(ptr, layout.size()))
            .ok_or(AllocError::OutOfMemory { size: layout.size(), align: layout.align() })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }

        // SAFETY: ptr was returned by std::alloc for this layout (caller
        // contract) and the layout has non-zero size.
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
    }

    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        debug_assert!(new_layout.size() >= old_layout.size());

        if old_layout.size() == 0 {
            // The old block is a dangling placeholder with nothing to free.
            // SAFETY: plain allocation of the new layout.
            return unsafe { self.allocate(new_layout) };
        }

        if new_layout.align() == old_layout.align() {
            // SAFETY: ptr/old_layout describe a live std::alloc block
            // (caller contract), the alignment is unchanged, and both sizes
            // are non-zero.
            let raw = unsafe { std::alloc::realloc(ptr.as_ptr(), old_layout, new_layout.size()) };
            return NonNull::new(raw)
                .map(|p| NonNull::slice_from_raw_parts(p, new_layout.size()))
                .ok_or(AllocError::OutOfMemory {
                    size: new_layout.size(),
                    align: new_layout.align(),
                });
        }

        // Alignment changed: realloc cannot help, relocate manually.
        // SAFETY: forwarded caller contract.
        let new_block = unsafe { self.allocate(new_layout)? };
        // SAFETY: both blocks are live and distinct; old_layout.size() bytes
        // fit in both.
        unsafe {
            core::ptr::copy_nonoverlapping(
                ptr.as_ptr(),
                new_block.cast::<u8>().as_ptr(),
                old_layout.size(),
            );
            self.deallocate(ptr, old_layout);
        }
        Ok(new_block)
    }

    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        debug_assert!(new_layout.size() <= old_layout.size());

        if new_layout.size() == 0 {
            // SAFETY: forwarded caller contract; the block ends here.
            unsafe { self.deallocate(ptr, old_layout) };
            return Ok(zero_sized_block(new_layout));
        }

        if new_layout.align() == old_layout.align() && old_layout.size() > 0 {
            // SAFETY: ptr/old_layout describe a live std::alloc block
            // (caller contract), the alignment is unchanged, and both sizes
            // are non-zero.
            let raw = unsafe { std::alloc::realloc(ptr.as_ptr(), old_layout, new_layout.size()) };
            return NonNull::new(raw)
                .map(|p| NonNull::slice_from_raw_parts(p, new_layout.size()))
                .ok_or(AllocError::OutOfMemory {
                    size: new_layout.size(),
                    align: new_layout.align(),
                });
        }

        // Alignment changed: realloc re-forms the block under the old
        // alignment, which would no longer match the layout the caller
        // frees with. Relocate manually.
        // SAFETY: forwarded caller contract.
        let new_block = unsafe { self.allocate(new_layout)? };
        // SAFETY: new_layout.size() bytes are valid in both blocks.
        unsafe {
            core::ptr::copy_nonoverlapping(
                ptr.as_ptr(),
                new_block.cast::<u8>().as_ptr(),
                new_layout.size(),
            );
            self.deallocate(ptr, old_layout);
        }
        Ok(new_block)
    }
}

// SAFETY: std::alloc is thread-safe and the handle carries no state.
unsafe impl ThreadSafeAllocator for SystemAllocator {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_deallocate() {
        let allocator = SystemAllocator::new();
        let layout = Layout::from_size_align(128, 16).unwrap();

        unsafe {
            let block = allocator.allocate(layout).expect("allocation failed");
            assert_eq!(block.len(), 128);
            assert!(block.cast::<u8>().as_ptr() as usize % 16 == 0);

            block.cast::<u8>().as_ptr().write_bytes(0xAB, 128);
            allocator.deallocate(block.cast(), layout);
        }
    }

    #[test]
    fn test_zero_sized_allocation() {
        let allocator = SystemAllocator::new();
        let layout = Layout::from_size_align(0, 8).unwrap();

        unsafe {
            let block = allocator.allocate(layout).expect("zero-sized allocation failed");
            assert_eq!(block.len(), 0);
            assert_eq!(block.cast::<u8>().as_ptr() as usize % 8, 0);
            allocator.deallocate(block.cast(), layout);
        }
    }

    #[test]
    fn test_grow_preserves_contents() {
        let allocator = SystemAllocator::new();
        let small = Layout::from_size_align(32, 8).unwrap();
        let large = Layout::from_size_align(256, 8).unwrap();

        unsafe {
            let block = allocator.allocate(small).expect("allocation failed");
            for i in 0..32 {
                block.cast::<u8>().as_ptr().add(i).write(i as u8);
            }

            let grown = allocator.grow(block.cast(), small, large).expect("grow failed");
            assert!(grown.len() >= 256);
            for i in 0..32 {
                assert_eq!(*grown.cast::<u8>().as_ptr().add(i), i as u8);
            }

            allocator.deallocate(grown.cast(), large);
        }
    }

    #[test]
    fn test_grow_to_stricter_alignment() {
        let allocator = SystemAllocator::new();
        let old = Layout::from_size_align(16, 2).unwrap();
        let new = Layout::from_size_align(64, 64).unwrap();

        unsafe {
            let block = allocator.allocate(old).expect("allocation failed");
            block.cast::<u8>().as_ptr().write_bytes(0x5A, 16);

            let grown = allocator.grow(block.cast(), old, new).expect("grow failed");
            assert_eq!(grown.cast::<u8>().as_ptr() as usize % 64, 0);
            assert_eq!(*grown.cast::<u8>().as_ptr().add(15), 0x5A);

            allocator.deallocate(grown.cast(), new);
        }
    }

    #[test]
    fn test_shrink_to_looser_alignment_relocates() {
        let allocator = SystemAllocator::new();
        let old = Layout::from_size_align(256, 64).unwrap();
        let new = Layout::from_size_align(64, 8).unwrap();

        unsafe {
            let block = allocator.allocate(old).expect("allocation failed");
            for i in 0..64 {
                block.cast::<u8>().as_ptr().add(i).write(i as u8);
            }
            let old_addr = block.cast::<u8>().as_ptr() as usize;

            let shrunk = allocator.shrink(block.cast(), old, new).expect("shrink failed");
            // The block must move: the old one was formed under the 64-byte
            // alignment and can only be freed that way.
            assert_ne!(shrunk.cast::<u8>().as_ptr() as usize, old_addr);
            for i in 0..64 {
                assert_eq!(*shrunk.cast::<u8>().as_ptr().add(i), i as u8);
            }

            allocator.deallocate(shrunk.cast(), new);
        }
    }

    #[test]
    fn test_shrink_to_zero_releases() {
        let allocator = SystemAllocator::new();
        let old = Layout::from_size_align(64, 8).unwrap();
        let empty = Layout::from_size_align(0, 8).unwrap();

        unsafe {
            let block = allocator.allocate(old).expect("allocation failed");
            let shrunk = allocator.shrink(block.cast(), old, empty).expect("shrink failed");
            assert_eq!(shrunk.len(), 0);
            allocator.deallocate(shrunk.cast(), empty);
        }
    }
}
