//! Utility functions and helpers for scoped-alloc
//!
//! Alignment helpers and the checked size arithmetic every allocator uses
//! before rounding a request.

use crate::error::{AllocError, AllocResult};

/// Aligns a value up to the nearest multiple of alignment
///
/// # Examples
/// ```
/// use scoped_alloc::utils::align_up;
///
/// assert_eq!(align_up(7, 8), 8);
/// assert_eq!(align_up(8, 8), 8);
/// assert_eq!(align_up(9, 8), 16);
/// ```
#[inline(always)]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Aligns a value down to the nearest multiple of alignment
///
/// # Examples
/// ```
/// use scoped_alloc::utils::align_down;
///
/// assert_eq!(align_down(9, 8), 8);
/// ```
#[inline(always)]
pub const fn align_down(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    value & !(alignment - 1)
}

/// Overflow-checked `align_up(value + extra, alignment)`
///
/// Every allocator adds its metadata overhead to the client size before
/// rounding; requests near `usize::MAX` must surface as
/// [`MemoryError::SizeOverflow`](crate::MemoryError::SizeOverflow) instead of
/// wrapping.
#[inline]
pub fn checked_padded_size(
    value: usize,
    extra: usize,
    alignment: usize,
    operation: &str,
) -> AllocResult<usize> {
    debug_assert!(alignment.is_power_of_two());
    value
        .checked_add(extra)
        .and_then(|v| v.checked_add(alignment - 1))
        .map(|v| align_down(v, alignment))
        .filter(|&v| v <= isize::MAX as usize)
        .ok_or_else(|| AllocError::size_overflow(operation))
}
