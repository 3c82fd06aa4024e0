//! Allocation statistics tracking
//!
//! `AllocationCounters` is the lock-free accumulator shared between an
//! allocator and whoever observes it; `AllocationStats` is a plain snapshot.

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::AllocationTracker;

/// Snapshot of allocation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationStats {
    /// Total bytes ever allocated (cumulative)
    pub total_allocated: usize,
    /// Total bytes ever freed (cumulative)
    pub total_freed: usize,
    /// Number of allocations
    pub allocation_count: usize,
    /// Number of frees
    pub free_count: usize,
    /// Peak outstanding bytes
    pub peak_bytes: usize,
}

impl AllocationStats {
    /// Bytes currently outstanding
    pub fn current_bytes(&self) -> usize {
        self.total_allocated.saturating_sub(self.total_freed)
    }

    /// Every allocated byte has been freed
    pub fn is_all_freed(&self) -> bool {
        self.total_allocated == self.total_freed
    }

    /// Calculate the average allocation size
    pub fn average_allocation_size(&self) -> Option<f64> {
        if self.allocation_count > 0 {
            Some(self.total_allocated as f64 / self.allocation_count as f64)
        } else {
            None
        }
    }
}

impl fmt::Display for AllocationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Allocation Statistics:")?;
        writeln!(f, "  Allocated: {} bytes", self.total_allocated)?;
        writeln!(f, "  Freed: {} bytes", self.total_freed)?;
        writeln!(f, "  Outstanding: {} bytes", self.current_bytes())?;
        writeln!(f, "  Peak: {} bytes", self.peak_bytes)?;
        writeln!(f, "  Allocations: {}", self.allocation_count)?;
        write!(f, "  Frees: {}", self.free_count)
    }
}

/// Thread-safe allocation counters
#[derive(Debug, Default)]
pub struct AllocationCounters {
    total_allocated: AtomicUsize,
    total_freed: AtomicUsize,
    allocation_count: AtomicUsize,
    free_count: AtomicUsize,
    peak_bytes: AtomicUsize,
}

impl AllocationCounters {
    /// Creates zeroed counters
    pub const fn new() -> Self {
        Self {
            total_allocated: AtomicUsize::new(0),
            total_freed: AtomicUsize::new(0),
            allocation_count: AtomicUsize::new(0),
            free_count: AtomicUsize::new(0),
            peak_bytes: AtomicUsize::new(0),
        }
    }

    /// Record an allocation of `bytes`
    pub fn record_allocation(&self, bytes: usize) {
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
        let allocated = self.total_allocated.fetch_add(bytes, Ordering::AcqRel) + bytes;
        let current = allocated.saturating_sub(self.total_freed.load(Ordering::Acquire));
        self.peak_bytes.fetch_max(current, Ordering::Relaxed);
    }

    /// Record a free of `bytes`
    pub fn record_free(&self, bytes: usize) {
        self.free_count.fetch_add(1, Ordering::Relaxed);
        self.total_freed.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Get a snapshot of the current statistics
    pub fn snapshot(&self) -> AllocationStats {
        AllocationStats {
            total_allocated: self.total_allocated.load(Ordering::Acquire),
            total_freed: self.total_freed.load(Ordering::Acquire),
            allocation_count: self.allocation_count.load(Ordering::Relaxed),
            free_count: self.free_count.load(Ordering::Relaxed),
            peak_bytes: self.peak_bytes.load(Ordering::Relaxed),
        }
    }

    /// Every allocated byte has been freed
    pub fn is_all_freed(&self) -> bool {
        self.total_allocated.load(Ordering::Acquire) == self.total_freed.load(Ordering::Acquire)
    }
}

impl AllocationTracker for AllocationCounters {
    #[inline]
    fn client_allocate(&self, bytes: usize) {
        self.record_allocation(bytes);
    }

    #[inline]
    fn client_free(&self, bytes: usize) {
        self.record_free(bytes);
    }
}
