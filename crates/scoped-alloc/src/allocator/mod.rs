//! Allocator capability and the leaf allocators
//!
//! This module defines the allocator contract shared by every component of
//! the crate, plus the native allocator everything bottoms out in and a
//! tracking wrapper for leak checks.

// Core allocator types
pub(crate) mod header;
mod native;
mod stats;
mod tracked;
mod traits;

pub use crate::error::{AllocError, AllocResult};
pub use native::NativeAllocator;
pub use stats::{AllocationCounters, AllocationStats};
pub use tracked::TrackedAllocator;
pub use traits::{AllocationTracker, Allocator, AllocatorRef, Reallocated, ScopedAllocator};
