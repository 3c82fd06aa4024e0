//! Core functionality for scoped-alloc
//!
//! Common constants and re-exports shared by the allocator modules.

pub mod types;

// Re-export commonly used items
pub use crate::error::{MemoryError, MemoryResult};
pub use types::*;
