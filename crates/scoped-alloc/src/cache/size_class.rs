//! Size classing
//!
//! Requests are rounded up to a granularity that grows with their
//! magnitude: an eighth of the size's leading power of two, never less than
//! the default alignment. Worst-case internal waste is therefore bounded at
//! roughly 12.5% while the number of distinct classes stays logarithmic.

use crate::core::alignment::DEFAULT_ALIGN;
use crate::error::{AllocError, AllocResult};
use crate::utils::checked_padded_size;

/// log2 of the number of classes per power of two
const CLASS_BITS: u32 = 3;

/// Granularity used for a raw (overhead-included) size
#[inline]
pub(crate) fn granularity(raw: usize) -> usize {
    let bit_len = usize::BITS - raw.leading_zeros();
    // the leading power of two is `1 << (bit_len - 1)`
    let shift = bit_len.saturating_sub(CLASS_BITS + 1);
    (1usize << shift).max(DEFAULT_ALIGN)
}

/// Allocation size (header included) for a client request of `size` bytes
pub(crate) fn class_for(size: usize, overhead: usize) -> AllocResult<usize> {
    let raw = size
        .checked_add(overhead)
        .ok_or_else(|| AllocError::size_overflow("cache size class"))?;
    checked_padded_size(raw, 0, granularity(raw), "cache size class")
}
