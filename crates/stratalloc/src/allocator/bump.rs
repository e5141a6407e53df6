//! Bump allocator over a fixed contiguous region.

use core::alloc::Layout;
use core::cell::Cell;
use core::ptr::NonNull;

use crate::allocator::traits::{Allocator, MemoryUsage, Owns, Resettable};
use crate::error::{AllocError, AllocResult};
use crate::utils::{align_up, is_aligned, zero_sized_block};

/// Alignment of the backing buffer. Any request with alignment up to this
/// is satisfiable without per-allocation padding waste at the buffer start.
const BUFFER_ALIGN: usize = 64;

/// Saved cursor position, handed out by [`BumpAllocator::checkpoint`].
///
/// Carries the generation of the allocator at capture time; a checkpoint
/// taken before a [`reset`](Resettable::reset) is stale and restoring it is
/// a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BumpCheckpoint {
    position: usize,
    generation: u64,
}

/// Bump allocator: a cursor over one contiguous buffer.
///
/// Allocation aligns the cursor and advances it; that is the whole fast
/// path. Individual deallocation only reclaims when the freed block is the
/// most recent one (the cursor retracts), so the intended shape of use is
/// phase-based: allocate freely, then release everything at once with
/// [`reset`](Resettable::reset), [`restore`](BumpAllocator::restore), or a
/// [`scoped`](BumpAllocator::scoped) guard.
///
/// # Thread safety
///
/// The cursor is a [`Cell`], so the allocator is `!Sync` and sharing it
/// across threads is rejected at compile time:
///
/// ```compile_fail
/// fn assert_sync<T: Sync>() {}
/// assert_sync::<stratalloc::allocator::BumpAllocator>();
/// ```
///
/// It is `Send`: moving the whole allocator to another thread is fine.
pub struct BumpAllocator {
    buffer: NonNull<u8>,
    buffer_layout: Layout,
    start: usize,
    end: usize,
    cursor: Cell<usize>,
    peak: Cell<usize>,
    generation: Cell<u64>,
}

impl BumpAllocator {
    /// Creates a bump allocator with `capacity` bytes of backing memory.
    ///
    /// The buffer is heap-allocated once, aligned to 64 bytes, and freed on
    /// drop.
    ///
    /// # Errors
    /// `InvalidConfig` for a zero capacity, `SizeOverflow` if the buffer
    /// layout cannot be formed, `OutOfMemory` if the heap refuses it.
    pub fn new(capacity: usize) -> AllocResult<Self> {
        if capacity == 0 {
            return Err(AllocError::invalid_config("bump capacity must be non-zero"));
        }

        let buffer_layout = Layout::from_size_align(capacity, BUFFER_ALIGN)
            .map_err(|_| AllocError::size_overflow("bump buffer layout"))?;

        // SAFETY: buffer_layout has non-zero size.
        let raw = unsafe { std::alloc::alloc(buffer_layout) };
        let buffer = NonNull::new(raw)
            .ok_or(AllocError::OutOfMemory { size: capacity, align: BUFFER_ALIGN })?;

        let start = buffer.as_ptr() as usize;
        Ok(Self {
            buffer,
            buffer_layout,
            start,
            end: start + capacity,
            cursor: Cell::new(start),
            peak: Cell::new(0),
            generation: Cell::new(0),
        })
    }

    /// Total capacity in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.end - self.start
    }

    /// Bytes consumed so far, padding included.
    #[inline]
    #[must_use]
    pub fn used(&self) -> usize {
        self.cursor.get() - self.start
    }

    /// Bytes still available at the cursor.
    #[inline]
    #[must_use]
    pub fn available(&self) -> usize {
        self.end - self.cursor.get()
    }

    /// Highest usage observed since creation or the last reset.
    #[inline]
    #[must_use]
    pub fn peak_usage(&self) -> usize {
        self.peak.get()
    }

    /// Captures the current cursor position.
    #[must_use]
    pub fn checkpoint(&self) -> BumpCheckpoint {
        BumpCheckpoint { position: self.cursor.get(), generation: self.generation.get() }
    }

    /// Rolls the cursor back to `checkpoint`, releasing everything
    /// allocated after it.
    ///
    /// Checkpoints from before a reset carry a stale generation and are
    /// ignored, as are positions the cursor has already retreated past.
    ///
    /// # Safety
    /// All blocks allocated after the checkpoint become invalid; the caller
    /// must ensure none are used afterwards.
    pub unsafe fn restore(&self, checkpoint: BumpCheckpoint) {
        if checkpoint.generation != self.generation.get() {
            return;
        }
        if checkpoint.position >= self.start && checkpoint.position <= self.cursor.get() {
            self.cursor.set(checkpoint.position);
        }
    }

    /// Returns a guard that restores the current position when dropped.
    ///
    /// Blocks allocated inside the scope are released on drop and must not
    /// outlive it.
    #[must_use]
    pub fn scoped(&self) -> BumpScope<'_> {
        BumpScope { allocator: self, checkpoint: self.checkpoint() }
    }

    #[inline]
    fn pointer_at(&self, addr: usize) -> NonNull<u8> {
        // SAFETY: addr lies within the live buffer (checked by callers), so
        // offsetting the buffer pointer stays in bounds and non-null.
        unsafe { NonNull::new_unchecked(self.buffer.as_ptr().add(addr - self.start)) }
    }

    #[inline]
    fn note_usage(&self, cursor: usize) {
        let used = cursor - self.start;
        if used > self.peak.get() {
            self.peak.set(used);
        }
    }
}

/// Scope guard from [`BumpAllocator::scoped`].
pub struct BumpScope<'a> {
    allocator: &'a BumpAllocator,
    checkpoint: BumpCheckpoint,
}

impl Drop for BumpScope<'_> {
    fn drop(&mut self) {
        // SAFETY: The scope's contract is that blocks allocated inside it
        // do not outlive it.
        unsafe { self.allocator.restore(self.checkpoint) };
    }
}

// SAFETY: Pointers stay within the owned buffer, aligned by align_up, and
// the cursor never passes end, so distinct allocations never overlap.
unsafe impl Allocator for BumpAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        if layout.size() == 0 {
            return Ok(zero_sized_block(layout));
        }

        let aligned = align_up(self.cursor.get(), layout.align());
        let new_cursor = aligned
            .checked_add(layout.size())
            .ok_or_else(|| AllocError::size_overflow("bump allocation"))?;

        if new_cursor > self.end {
            return Err(AllocError::OutOfMemory { size: layout.size(), align: layout.align() });
        }

        self.cursor.set(new_cursor);
        self.note_usage(new_cursor);
        Ok(NonNull::slice_from_raw_parts(self.pointer_at(aligned), layout.size()))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // Only the most recent block can be reclaimed; everything else
        // waits for reset/restore.
        let addr = ptr.as_ptr() as usize;
        if addr.checked_add(layout.size()) == Some(self.cursor.get()) && addr >= self.start {
            self.cursor.set(addr);
        }
    }

    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        debug_assert!(new_layout.size() >= old_layout.size());

        if old_layout.size() == 0 {
            // The old block was a dangling placeholder.
            // SAFETY: plain allocation of the new layout.
            return unsafe { self.allocate(new_layout) };
        }

        let addr = ptr.as_ptr() as usize;
        let is_tail = addr.checked_add(old_layout.size()) == Some(self.cursor.get());

        if !is_tail || !is_aligned(addr, new_layout.align()) {
            // An interior block cannot move its neighbors; a tail block at
            // the wrong address cannot satisfy the new alignment in place.
            // The caller (or a fallback layer above) relocates instead.
            return Err(AllocError::unsupported("bump in-place grow"));
        }

        let new_cursor = addr
            .checked_add(new_layout.size())
            .ok_or_else(|| AllocError::size_overflow("bump grow"))?;
        if new_cursor > self.end {
            return Err(AllocError::OutOfMemory {
                size: new_layout.size(),
                align: new_layout.align(),
            });
        }

        self.cursor.set(new_cursor);
        self.note_usage(new_cursor);
        Ok(NonNull::slice_from_raw_parts(ptr, new_layout.size()))
    }

    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        debug_assert!(new_layout.size() <= old_layout.size());

        let addr = ptr.as_ptr() as usize;
        if !is_aligned(addr, new_layout.align()) {
            return Err(AllocError::unsupported("bump shrink to stricter alignment"));
        }

        // A tail block returns the freed suffix to the cursor; an interior
        // block narrows in place and the suffix stays dead until reset.
        if addr.checked_add(old_layout.size()) == Some(self.cursor.get()) {
            self.cursor.set(addr + new_layout.size());
        }

        Ok(NonNull::slice_from_raw_parts(ptr, new_layout.size()))
    }

    fn max_allocation_size(&self) -> usize {
        self.capacity()
    }
}

impl Owns for BumpAllocator {
    fn owns(&self, ptr: NonNull<u8>, layout: Layout) -> bool {
        let addr = ptr.as_ptr() as usize;
        addr >= self.start
            && addr
                .checked_add(layout.size())
                .is_some_and(|block_end| block_end <= self.cursor.get())
    }
}

impl MemoryUsage for BumpAllocator {
    fn used_memory(&self) -> usize {
        self.used()
    }

    fn available_memory(&self) -> Option<usize> {
        Some(self.available())
    }

    fn total_memory(&self) -> Option<usize> {
        Some(self.capacity())
    }
}

impl Resettable for BumpAllocator {
    unsafe fn reset(&self) {
        self.cursor.set(self.start);
        self.generation.set(self.generation.get() + 1);
        self.peak.set(0);
    }
}

impl Drop for BumpAllocator {
    fn drop(&mut self) {
        // SAFETY: buffer was allocated in new() with buffer_layout and is
        // freed exactly once.
        unsafe { std::alloc::dealloc(self.buffer.as_ptr(), self.buffer_layout) };
    }
}

// SAFETY: The buffer pointer is uniquely owned; moving the allocator moves
// exclusive access to the buffer and the Cell state with it. No Sync impl
// exists, so the cells are never touched from two threads.
unsafe impl Send for BumpAllocator {}

impl core::fmt::Debug for BumpAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BumpAllocator")
            .field("capacity", &self.capacity())
            .field("used", &self.used())
            .field("peak", &self.peak.get())
            .finish()
    }
}
