//! Guard bytes around every allocation.

use core::alloc::Layout;
use core::marker::PhantomData;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::allocator::traits::{Allocator, MemoryUsage, Owns, Resettable, ThreadSafeAllocator};
use crate::error::{AllocError, AllocResult};

/// Value stamped before or after the payload and checked on release.
///
/// `stamp` writes the pattern, `verify` checks that the bytes still carry
/// it. Use `()` for a side that needs no guard.
pub trait GuardPattern: Copy {
    /// The pattern value written next to a fresh allocation.
    fn stamp() -> Self;

    /// Whether the value still matches what `stamp` wrote.
    fn verify(&self) -> bool;
}

impl GuardPattern for () {
    fn stamp() -> Self {}

    fn verify(&self) -> bool {
        true
    }
}

/// Eight recognizable bytes; a partial overwrite still fails verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Canary([u8; 8]);

impl Canary {
    const PATTERN: [u8; 8] = [0xDE, 0xAD, 0xC0, 0xDE, 0xDE, 0xAD, 0xC0, 0xDE];
}

impl GuardPattern for Canary {
    fn stamp() -> Self {
        Self(Self::PATTERN)
    }

    fn verify(&self) -> bool {
        self.0 == Self::PATTERN
    }
}

/// What to do with a block whose guards fail verification on release.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CorruptionPolicy {
    /// Keep the block allocated. Freeing memory with trampled guard bytes
    /// risks corrupting allocator metadata next to it; leaking is the
    /// conservative answer.
    #[default]
    RefuseToFree,
    /// Free the block anyway and rely on the report.
    FreeAndReport,
}

/// Offsets of one guarded allocation, derived from the payload layout.
struct AffixLayout {
    full: Layout,
    payload_offset: usize,
    suffix_offset: usize,
}

fn affix_layout<P, S>(payload: Layout) -> AllocResult<AffixLayout> {
    let (with_payload, payload_offset) = Layout::new::<P>()
        .extend(payload)
        .map_err(|_| AllocError::size_overflow("affix layout"))?;
    let (full, suffix_offset) = with_payload
        .extend(Layout::new::<S>())
        .map_err(|_| AllocError::size_overflow("affix layout"))?;
    Ok(AffixLayout { full: full.pad_to_align(), payload_offset, suffix_offset })
}

/// Wraps an allocator and brackets every block with guard values.
///
/// Each request is widened to `[P][payload][S]`, the guards are stamped on
/// allocation, and every release or resize verifies them first. A failed
/// check counts, logs, and surfaces as an integrity violation; whether the
/// block is still freed is the [`CorruptionPolicy`].
///
/// The payload pointer handed out is interior to the underlying block, so
/// all operations recompute the block base from the payload layout. That is
/// why [`Owns::owns`] takes the layout alongside the pointer.
///
/// `deallocate` cannot report, so it applies the policy silently; callers
/// that want the verdict use
/// [`try_deallocate`](AffixAllocator::try_deallocate).
#[derive(Debug)]
pub struct AffixAllocator<A, P: GuardPattern = Canary, S: GuardPattern = Canary> {
    inner: A,
    policy: CorruptionPolicy,
    corruption_count: AtomicUsize,
    _guards: PhantomData<(P, S)>,
}

impl<A, P: GuardPattern, S: GuardPattern> AffixAllocator<A, P, S> {
    /// Wraps `inner` with the default [`CorruptionPolicy::RefuseToFree`].
    pub const fn new(inner: A) -> Self {
        Self::with_policy(inner, CorruptionPolicy::RefuseToFree)
    }

    /// Wraps `inner` with an explicit corruption policy.
    pub const fn with_policy(inner: A, policy: CorruptionPolicy) -> Self {
        Self { inner, policy, corruption_count: AtomicUsize::new(0), _guards: PhantomData }
    }

    /// The wrapped allocator.
    pub const fn inner(&self) -> &A {
        &self.inner
    }

    /// The active corruption policy.
    pub const fn policy(&self) -> CorruptionPolicy {
        self.policy
    }

    /// Guard verification failures observed so far.
    pub fn corruption_count(&self) -> usize {
        self.corruption_count.load(Ordering::Relaxed)
    }

    /// Consumes the wrapper and returns the inner allocator.
    pub fn into_inner(self) -> A {
        self.inner
    }

    unsafe fn stamp_guards(base: NonNull<u8>, affix: &AffixLayout) {
        // SAFETY: Both guard slots lie within the full block and are
        // aligned by Layout::extend.
        unsafe {
            base.cast::<P>().as_ptr().write(P::stamp());
            base.as_ptr().add(affix.suffix_offset).cast::<S>().write(S::stamp());
        }
    }

    unsafe fn guards_intact(base: NonNull<u8>, affix: &AffixLayout) -> bool {
        // SAFETY: Same bounds and alignment argument as stamp_guards; the
        // block is live per the caller.
        let prefix_ok = unsafe { base.cast::<P>().as_ptr().read().verify() };
        let suffix_ok =
            unsafe { base.as_ptr().add(affix.suffix_offset).cast::<S>().read().verify() };
        prefix_ok && suffix_ok
    }

    fn note_corruption(&self, details: &'static str) -> AllocError {
        self.corruption_count.fetch_add(1, Ordering::Relaxed);
        AllocError::integrity_violation("affix", details)
    }
}

impl<A: Allocator, P: GuardPattern, S: GuardPattern> AffixAllocator<A, P, S> {
    /// Releases a block, reporting trampled guards instead of swallowing
    /// them.
    ///
    /// On a verification failure the corruption counter is bumped and the
    /// block is freed only under [`CorruptionPolicy::FreeAndReport`].
    ///
    /// # Safety
    /// Same contract as [`Allocator::deallocate`].
    ///
    /// # Errors
    /// `IntegrityViolation` if either guard fails verification.
    pub unsafe fn try_deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> AllocResult<()> {
        let affix = affix_layout::<P, S>(layout)?;
        // SAFETY: ptr is the payload pointer of a block whose base lies
        // payload_offset bytes below it (caller contract).
        let base = unsafe { NonNull::new_unchecked(ptr.as_ptr().sub(affix.payload_offset)) };

        // SAFETY: the block is live (caller contract).
        if unsafe { Self::guards_intact(base, &affix) } {
            // SAFETY: base/full describe the block as the inner allocator
            // issued it.
            unsafe { self.inner.deallocate(base, affix.full) };
            return Ok(());
        }

        let error = self.note_corruption("guard bytes corrupted on release");
        if self.policy == CorruptionPolicy::FreeAndReport {
            // SAFETY: as above; the policy accepts the risk.
            unsafe { self.inner.deallocate(base, affix.full) };
        }
        Err(error)
    }

    /// Verify guards, resize the full block, restamp.
    ///
    /// When the payload offset is unchanged the inner allocator resizes the
    /// block directly. When it changes (the payload alignment crossed the
    /// prefix size) the payload relocates through a fresh block, and the
    /// old block survives unmodified if the inner allocator fails.
    unsafe fn resize(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        let old_affix = affix_layout::<P, S>(old_layout)?;
        let new_affix = affix_layout::<P, S>(new_layout)?;

        // SAFETY: ptr is the payload pointer of a live block (caller
        // contract).
        let base = unsafe { NonNull::new_unchecked(ptr.as_ptr().sub(old_affix.payload_offset)) };
        // SAFETY: the block is live.
        if !unsafe { Self::guards_intact(base, &old_affix) } {
            return Err(self.note_corruption("guard bytes corrupted before resize"));
        }

        let new_base = if new_affix.payload_offset == old_affix.payload_offset {
            // SAFETY: base/old full layout describe the block as issued;
            // the payload keeps its offset through the resize.
            unsafe { self.inner.reallocate(base, old_affix.full, new_affix.full)? }.cast::<u8>()
        } else {
            // The payload moves to a different offset. Take a fresh block,
            // copy, then release the old one; a failed allocation leaves
            // the old block intact.
            // SAFETY: full is a valid layout covering guards and payload.
            let fresh = unsafe { self.inner.allocate(new_affix.full)? }.cast::<u8>();

            let copy_len = old_layout.size().min(new_layout.size());
            if copy_len > 0 {
                // SAFETY: the blocks are distinct and copy_len fits the
                // payload slot of both.
                unsafe {
                    core::ptr::copy_nonoverlapping(
                        base.as_ptr().add(old_affix.payload_offset),
                        fresh.as_ptr().add(new_affix.payload_offset),
                        copy_len,
                    );
                }
            }

            // SAFETY: base/old full describe the block as the inner issued
            // it; the payload has been carried over.
            unsafe { self.inner.deallocate(base, old_affix.full) };
            fresh
        };

        // SAFETY: new_base/new_affix describe the resized live block.
        unsafe { Self::stamp_guards(new_base, &new_affix) };

        // SAFETY: the payload slot lies within the new extent.
        let payload =
            unsafe { NonNull::new_unchecked(new_base.as_ptr().add(new_affix.payload_offset)) };
        Ok(NonNull::slice_from_raw_parts(payload, new_layout.size()))
    }
}

// SAFETY: The payload slice handed out is a disjoint sub-block of the inner
// allocation; guards occupy the rest and are never part of any payload.
unsafe impl<A: Allocator, P: GuardPattern, S: GuardPattern> Allocator for AffixAllocator<A, P, S> {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        let affix = affix_layout::<P, S>(layout)?;
        // SAFETY: full is a valid layout covering guards and payload.
        let block = unsafe { self.inner.allocate(affix.full)? };
        let base = block.cast::<u8>();

        // SAFETY: the block was just allocated for the full layout.
        unsafe { Self::stamp_guards(base, &affix) };

        // SAFETY: the payload slot lies within the block.
        let payload = unsafe { NonNull::new_unchecked(base.as_ptr().add(affix.payload_offset)) };
        Ok(NonNull::slice_from_raw_parts(payload, layout.size()))
    }

    unsafe fn allocate_zeroed(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        let affix = affix_layout::<P, S>(layout)?;
        // SAFETY: full is a valid layout; zeroing covers the payload slot.
        let block = unsafe { self.inner.allocate_zeroed(affix.full)? };
        let base = block.cast::<u8>();

        // SAFETY: the block was just allocated for the full layout.
        unsafe { Self::stamp_guards(base, &affix) };

        // SAFETY: the payload slot lies within the block.
        let payload = unsafe { NonNull::new_unchecked(base.as_ptr().add(affix.payload_offset)) };
        Ok(NonNull::slice_from_raw_parts(payload, layout.size()))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded caller contract; the verdict is dropped here
        // (the counter and log keep the record).
        let _ = unsafe { self.try_deallocate(ptr, layout) };
    }

    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        debug_assert!(new_layout.size() >= old_layout.size());
        // SAFETY: forwarded caller contract.
        unsafe { self.resize(ptr, old_layout, new_layout) }
    }

    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        debug_assert!(new_layout.size() <= old_layout.size());
        // SAFETY: forwarded caller contract.
        unsafe { self.resize(ptr, old_layout, new_layout) }
    }

    fn max_allocation_size(&self) -> usize {
        self.inner.max_allocation_size().saturating_sub(size_of::<P>() + size_of::<S>())
    }

    fn supports_zero_sized_allocations(&self) -> bool {
        // With at least one real guard a zero-sized payload still occupies
        // a real block.
        if size_of::<P>() + size_of::<S>() == 0 {
            self.inner.supports_zero_sized_allocations()
        } else {
            true
        }
    }
}

impl<A: Owns, P: GuardPattern, S: GuardPattern> Owns for AffixAllocator<A, P, S> {
    fn owns(&self, ptr: NonNull<u8>, layout: Layout) -> bool {
        let Ok(affix) = affix_layout::<P, S>(layout) else {
            return false;
        };
        // Arbitrary query pointers get wrapping arithmetic, not offsets.
        let base_addr = (ptr.as_ptr() as usize).wrapping_sub(affix.payload_offset);
        NonNull::new(base_addr as *mut u8)
            .is_some_and(|base| self.inner.owns(base, affix.full))
    }
}

impl<A: MemoryUsage, P: GuardPattern, S: GuardPattern> MemoryUsage for AffixAllocator<A, P, S> {
    /// Reports the inner allocator's numbers, guard overhead included.
    fn used_memory(&self) -> usize {
        self.inner.used_memory()
    }

    fn available_memory(&self) -> Option<usize> {
        self.inner.available_memory()
    }

    fn total_memory(&self) -> Option<usize> {
        self.inner.total_memory()
    }
}

impl<A: Resettable, P: GuardPattern, S: GuardPattern> Resettable for AffixAllocator<A, P, S> {
    unsafe fn reset(&self) {
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.reset() };
    }

    fn can_reset(&self) -> bool {
        self.inner.can_reset()
    }
}

// SAFETY: The corruption counter is atomic and guard types are plain
// values; thread safety reduces to the inner allocator's.
unsafe impl<A, P, S> ThreadSafeAllocator for AffixAllocator<A, P, S>
where
    A: ThreadSafeAllocator,
    P: GuardPattern + Send + Sync,
    S: GuardPattern + Send + Sync,
{
}
