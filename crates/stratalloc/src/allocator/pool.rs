//! Fixed-size block pool over a backing allocator.

use core::alloc::Layout;
use core::cell::{Cell, RefCell};
use core::ptr::NonNull;

use hashbrown::HashSet;

use crate::allocator::traits::{Allocator, MemoryUsage, Owns, Resettable};
use crate::error::{AllocError, AllocResult};
use crate::utils::{prev_power_of_two, zero_sized_block};

/// Free-list link written into the first bytes of a returned slab.
struct FreeSlab {
    next: Option<NonNull<FreeSlab>>,
}

/// Pool of `BLOCK_SIZE`-byte slabs carved from a backing allocator.
///
/// Every request up to `BLOCK_SIZE` bytes is served with a full slab, so
/// allocation after warm-up is a free-list pop and deallocation is a push,
/// with no call into the backing allocator. Slabs are fetched lazily one at
/// a time, which makes `PoolAllocator<BumpAllocator, 64>` carve a region
/// into uniform chunks without any up-front carving pass.
///
/// Slabs are aligned to the largest power of two not exceeding
/// `BLOCK_SIZE`; requests with stricter alignment are refused. Returned
/// slices are always the full `BLOCK_SIZE`, which callers may use as slack.
///
/// Freed slabs stay cached in the pool until it is dropped. Resetting the
/// backing allocator while the pool is alive invalidates that cache, so
/// reset order matters: pool first, backing after.
///
/// # Thread safety
///
/// The free list lives in a [`Cell`], so the pool is `!Sync`:
///
/// ```compile_fail
/// use stratalloc::allocator::{PoolAllocator, SystemAllocator};
/// fn assert_sync<T: Sync>() {}
/// assert_sync::<PoolAllocator<SystemAllocator, 64>>();
/// ```
pub struct PoolAllocator<A: Allocator, const BLOCK_SIZE: usize> {
    backing: A,
    free_head: Cell<Option<NonNull<FreeSlab>>>,
    free_count: Cell<usize>,
    live: RefCell<HashSet<NonNull<u8>>>,
    slab_layout: Layout,
}

impl<A: Allocator, const BLOCK_SIZE: usize> PoolAllocator<A, BLOCK_SIZE> {
    /// Creates a pool drawing `BLOCK_SIZE`-byte slabs from `backing`.
    ///
    /// # Errors
    /// `InvalidConfig` if `BLOCK_SIZE` cannot hold a free-list link,
    /// `SizeOverflow` if the slab layout cannot be formed.
    pub fn new(backing: A) -> AllocResult<Self> {
        if BLOCK_SIZE < size_of::<FreeSlab>() {
            return Err(AllocError::invalid_config("pool block size must hold a free-list link"));
        }

        let slab_align = prev_power_of_two(BLOCK_SIZE);
        let slab_layout = Layout::from_size_align(BLOCK_SIZE, slab_align)
            .map_err(|_| AllocError::size_overflow("pool slab layout"))?;

        Ok(Self {
            backing,
            free_head: Cell::new(None),
            free_count: Cell::new(0),
            live: RefCell::new(HashSet::new()),
            slab_layout,
        })
    }

    /// The backing allocator.
    pub const fn backing(&self) -> &A {
        &self.backing
    }

    /// Layout of each slab as requested from the backing allocator.
    #[must_use]
    pub const fn slab_layout(&self) -> Layout {
        self.slab_layout
    }

    /// Slabs currently handed out.
    #[must_use]
    pub fn live_blocks(&self) -> usize {
        self.live.borrow().len()
    }

    /// Slabs cached on the free list.
    #[must_use]
    pub fn free_blocks(&self) -> usize {
        self.free_count.get()
    }

    fn pop_free(&self) -> Option<NonNull<u8>> {
        let slab = self.free_head.get()?;
        // SAFETY: Every pointer on the free list was written as a FreeSlab
        // into a live, properly aligned slab by push_free.
        self.free_head.set(unsafe { slab.as_ref().next });
        self.free_count.set(self.free_count.get() - 1);
        Some(slab.cast())
    }

    fn push_free(&self, ptr: NonNull<u8>) {
        let slab = ptr.cast::<FreeSlab>();
        // SAFETY: The slab is BLOCK_SIZE >= size_of::<FreeSlab>() bytes and
        // aligned to at least align_of::<FreeSlab>() (new() guarantees
        // both), and it is no longer in use.
        unsafe { slab.as_ptr().write(FreeSlab { next: self.free_head.get() }) };
        self.free_head.set(Some(slab));
        self.free_count.set(self.free_count.get() + 1);
    }
}

// SAFETY: Slabs come from the backing allocator with slab_layout and are
// handed out whole; the live set keeps one slab from being issued twice,
// and the free list only holds slabs that were handed back.
unsafe impl<A: Allocator, const BLOCK_SIZE: usize> Allocator for PoolAllocator<A, BLOCK_SIZE> {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        if layout.size() > BLOCK_SIZE {
            return Err(AllocError::unsupported("allocation larger than pool block size"));
        }
        if layout.align() > self.slab_layout.align() {
            return Err(AllocError::invalid_alignment(layout.align()));
        }
        if layout.size() == 0 {
            return Ok(zero_sized_block(layout));
        }

        let ptr = match self.pop_free() {
            Some(ptr) => ptr,
            // SAFETY: slab_layout is a valid non-zero layout.
            None => unsafe { self.backing.allocate(self.slab_layout)? }.cast::<u8>(),
        };

        self.live.borrow_mut().insert(ptr);
        Ok(NonNull::slice_from_raw_parts(ptr, BLOCK_SIZE))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, _layout: Layout) {
        // Zero-sized placeholders and foreign pointers are not in the live
        // set; dropping them here keeps double-push off the free list.
        if !self.live.borrow_mut().remove(&ptr) {
            return;
        }
        self.push_free(ptr);
    }

    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        debug_assert!(new_layout.size() >= old_layout.size());

        if new_layout.size() > BLOCK_SIZE {
            return Err(AllocError::unsupported("pool grow beyond block size"));
        }
        if new_layout.align() > self.slab_layout.align() {
            return Err(AllocError::invalid_alignment(new_layout.align()));
        }
        if old_layout.size() == 0 {
            // SAFETY: the old block was a dangling placeholder.
            return unsafe { self.allocate(new_layout) };
        }

        // The slab already covers any size up to BLOCK_SIZE.
        Ok(NonNull::slice_from_raw_parts(ptr, BLOCK_SIZE))
    }

    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        debug_assert!(new_layout.size() <= old_layout.size());

        if new_layout.align() > self.slab_layout.align() {
            return Err(AllocError::invalid_alignment(new_layout.align()));
        }

        // The slab is kept whole even for a shrink to zero; the caller
        // still owns it and releases it through deallocate.
        Ok(NonNull::slice_from_raw_parts(ptr, BLOCK_SIZE))
    }

    fn max_allocation_size(&self) -> usize {
        BLOCK_SIZE
    }
}

impl<A: Allocator, const BLOCK_SIZE: usize> Owns for PoolAllocator<A, BLOCK_SIZE> {
    fn owns(&self, ptr: NonNull<u8>, layout: Layout) -> bool {
        layout.size() <= BLOCK_SIZE && self.live.borrow().contains(&ptr)
    }
}

impl<A: Allocator, const BLOCK_SIZE: usize> MemoryUsage for PoolAllocator<A, BLOCK_SIZE> {
    fn used_memory(&self) -> usize {
        self.live.borrow().len() * BLOCK_SIZE
    }

    /// Counts only slabs already cached in the pool; the backing allocator
    /// may be able to provide more.
    fn available_memory(&self) -> Option<usize> {
        Some(self.free_count.get() * BLOCK_SIZE)
    }
}

impl<A: Allocator, const BLOCK_SIZE: usize> Resettable for PoolAllocator<A, BLOCK_SIZE> {
    unsafe fn reset(&self) {
        let mut live = self.live.borrow_mut();
        for ptr in live.drain() {
            self.push_free(ptr);
        }
    }
}

impl<A: Allocator, const BLOCK_SIZE: usize> Drop for PoolAllocator<A, BLOCK_SIZE> {
    fn drop(&mut self) {
        let mut head = self.free_head.get();
        while let Some(slab) = head {
            // SAFETY: free-list nodes are live slabs; each is returned to
            // the backing allocator exactly once with the layout it was
            // allocated with.
            head = unsafe { slab.as_ref().next };
            unsafe { self.backing.deallocate(slab.cast(), self.slab_layout) };
        }
        for ptr in self.live.get_mut().drain() {
            // SAFETY: still-live slabs also came from the backing allocator
            // with slab_layout.
            unsafe { self.backing.deallocate(ptr, self.slab_layout) };
        }
    }
}

// SAFETY: The free list and live set only reference slabs obtained through
// the owned backing allocator; moving the pool moves exclusive access to
// all of them. There is no Sync impl, so the cells are confined to one
// thread at a time.
unsafe impl<A: Allocator + Send, const BLOCK_SIZE: usize> Send for PoolAllocator<A, BLOCK_SIZE> {}

impl<A: Allocator, const BLOCK_SIZE: usize> core::fmt::Debug for PoolAllocator<A, BLOCK_SIZE> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("block_size", &BLOCK_SIZE)
            .field("live", &self.live.borrow().len())
            .field("free", &self.free_count.get())
            .finish()
    }
}
