//! # scoped-alloc
//!
//! Native-memory allocators for code that wants to decide *where* memory
//! comes from without threading an allocator through every call.
//!
//! Three building blocks, all speaking the same [`Allocator`] contract:
//! - [`arena::ArenaAllocator`]: page-bump arena with exact-size free lists,
//!   released wholesale when its scope ends
//! - [`cache::AllocationPoolingCache`]: size-class cache in front of another
//!   allocator, with LRU eviction and a TTL that adapts per size class
//! - [`scope::AllocatorScopeManager`]: registry of allocator providers and a
//!   per-flow stack of open scopes, so "the current allocator" is one lookup
//!   away
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use scoped_alloc::prelude::*;
//!
//! # fn main() -> MemoryResult<()> {
//! const REQUEST: ProviderId = ProviderId::new(1);
//!
//! let manager = AllocatorScopeManager::new();
//! let provider = Arc::new(ArenaProvider::with_pooling_cache(
//!     ArenaConfig::default(),
//!     PoolingCacheConfig::default(),
//! )?);
//! manager.register_provider(provider.clone(), REQUEST, true)?;
//! manager.finalize_configuration()?;
//!
//! {
//!     let _scope = manager.begin_scope(REQUEST)?;
//!     manager.with_allocator(REQUEST, |allocator| -> MemoryResult<()> {
//!         let ptr = allocator.allocate(1000)?;
//!         unsafe { ptr.as_ptr().write_bytes(0, 1000) };
//!         Ok(())
//!     })??;
//!     assert_eq!(provider.client_stats().current_bytes(), 1000);
//! }
//!
//! // Scope ended: the arena was reset and its pages parked in the cache
//! assert!(provider.client_is_all_freed());
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `logging` (default): structured diagnostics through `tracing`
//! - `async`: task-local flows via [`scope::flow::scope`] (tokio)
//! - `full`: everything
//!
//! ## Safety
//!
//! Allocators hand out raw pointers; freeing or reallocating a pointer with
//! anything but the allocator that produced it is undefined behavior, except
//! that arenas detect foreign pointers from other arenas and panic.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(clippy::all)]
#![warn(clippy::perf)]
#![warn(clippy::pedantic)]
#![warn(rust_2018_idioms)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_lines)]
// Precision loss in usize/u64 -> f64 casts is acceptable for stats
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::inline_always)]
// Cast truncation/sign-loss in memory code is reviewed per-site
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::double_must_use)]
#![allow(clippy::return_self_not_must_use)]
// Header reads cast payload pointers to header pointers; alignment is
// guaranteed by the block layout
#![allow(clippy::cast_ptr_alignment)]

mod macros;

// Error types
pub mod error;

// Core modules
pub mod allocator;
pub mod arena;
pub mod cache;
pub mod core;
pub mod pool;
pub mod scope;
pub mod utils;

pub use crate::error::{MemoryError, MemoryResult, Result};

// Public API exports
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::error::{MemoryError, MemoryResult, Result};

    pub use crate::allocator::{
        AllocError, AllocResult, Allocator, AllocatorRef, NativeAllocator, ScopedAllocator,
        TrackedAllocator,
    };

    pub use crate::arena::{ArenaAllocator, ArenaConfig};

    pub use crate::cache::{AllocationPoolingCache, PoolingCacheConfig};

    pub use crate::pool::{InstancePool, Poolable};

    pub use crate::scope::{
        AllocatorProvider, AllocatorScopeManager, ArenaProvider, CachingProvider,
        GlobalScopeManager, NativeProvider, ProviderId, ScopeHandle,
    };
}

// Re-export allocator types at crate root for convenience
pub use crate::allocator::{AllocError, AllocResult, Allocator, AllocatorRef, ScopedAllocator};
pub use crate::scope::{AllocatorScopeManager, ProviderId};
