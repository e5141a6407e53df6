//! Alignment arithmetic and small atomic helpers shared by the allocator
//! components.

use core::alloc::Layout;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Rounds `value` up to the next multiple of `align`.
///
/// `align` must be a power of two. The caller is responsible for ensuring
/// the rounded value does not overflow; address arithmetic inside a live
/// buffer cannot.
#[inline]
#[must_use]
pub const fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Rounds `value` down to the previous multiple of `align`.
///
/// `align` must be a power of two.
#[inline]
#[must_use]
pub const fn align_down(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    value & !(align - 1)
}

/// Returns `true` if `value` is a multiple of `align`.
///
/// `align` must be a power of two.
#[inline]
#[must_use]
pub const fn is_aligned(value: usize, align: usize) -> bool {
    debug_assert!(align.is_power_of_two());
    value & (align - 1) == 0
}

/// Bytes of padding needed to bring `value` up to `align`.
#[inline]
#[must_use]
pub const fn padding_needed(value: usize, align: usize) -> usize {
    align_up(value, align) - value
}

/// Largest power of two that is less than or equal to `value`.
///
/// `value` must be non-zero.
#[inline]
#[must_use]
pub const fn prev_power_of_two(value: usize) -> usize {
    debug_assert!(value > 0);
    1 << (usize::BITS - 1 - value.leading_zeros())
}

/// Raises `cell` to `value` if `value` is larger, racing against other
/// writers. Used for peak high-water marks.
#[inline]
pub fn atomic_max(cell: &AtomicUsize, value: usize) {
    let mut current = cell.load(Ordering::Relaxed);
    while value > current {
        match cell.compare_exchange_weak(current, value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(actual) => current = actual,
        }
    }
}

/// A well-formed block for a zero-sized request: non-null, aligned to the
/// request, backed by no storage.
#[inline]
pub(crate) fn zero_sized_block(layout: Layout) -> NonNull<[u8]> {
    let ptr = core::ptr::without_provenance_mut::<u8>(layout.align());
    // SAFETY: `Layout` guarantees a non-zero, power-of-two alignment, so the
    // address is never null.
    let ptr = unsafe { NonNull::new_unchecked(ptr) };
    NonNull::slice_from_raw_parts(ptr, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(9, 8), 16);
        assert_eq!(align_up(17, 1), 17);
    }

    #[test]
    fn test_align_down() {
        assert_eq!(align_down(0, 8), 0);
        assert_eq!(align_down(7, 8), 0);
        assert_eq!(align_down(8, 8), 8);
        assert_eq!(align_down(15, 8), 8);
    }

    #[test]
    fn test_is_aligned() {
        assert!(is_aligned(0, 16));
        assert!(is_aligned(32, 16));
        assert!(!is_aligned(17, 16));
        assert!(is_aligned(17, 1));
    }

    #[test]
    fn test_padding_needed() {
        assert_eq!(padding_needed(0, 8), 0);
        assert_eq!(padding_needed(1, 8), 7);
        assert_eq!(padding_needed(8, 8), 0);
    }

    #[test]
    fn test_prev_power_of_two() {
        assert_eq!(prev_power_of_two(1), 1);
        assert_eq!(prev_power_of_two(2), 2);
        assert_eq!(prev_power_of_two(3), 2);
        assert_eq!(prev_power_of_two(64), 64);
        assert_eq!(prev_power_of_two(100), 64);
    }

    #[test]
    fn test_atomic_max() {
        let cell = AtomicUsize::new(10);
        atomic_max(&cell, 5);
        assert_eq!(cell.load(Ordering::Relaxed), 10);
        atomic_max(&cell, 42);
        assert_eq!(cell.load(Ordering::Relaxed), 42);
    }

    #[test]
    fn test_zero_sized_block() {
        let layout = Layout::from_size_align(0, 64).unwrap();
        let block = zero_sized_block(layout);
        assert_eq!(block.len(), 0);
        assert!(is_aligned(block.cast::<u8>().as_ptr() as usize, 64));
    }
}
