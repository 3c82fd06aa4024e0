//! Page-based arena allocation
//!
//! An [`ArenaAllocator`] bump-allocates out of pages drawn from an inner
//! allocator, recycles freed blocks through exact-size free lists and
//! releases everything at once when its scope ends.

mod allocator;
mod config;

pub use allocator::{ArenaAllocator, ArenaStats};
pub use config::ArenaConfig;
