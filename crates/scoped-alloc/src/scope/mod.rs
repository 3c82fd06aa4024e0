//! Flow-scoped allocator contexts
//!
//! Providers are registered under small integer ids, then a flow opens
//! scopes on them and asks for "the current allocator" without threading it
//! through every call:
//!
//! ```
//! use std::sync::Arc;
//!
//! use scoped_alloc::arena::ArenaConfig;
//! use scoped_alloc::scope::{AllocatorScopeManager, ArenaProvider, ProviderId};
//!
//! # fn main() -> scoped_alloc::MemoryResult<()> {
//! const SCRATCH: ProviderId = ProviderId::new(1);
//!
//! let manager = AllocatorScopeManager::new();
//! let provider = Arc::new(ArenaProvider::new(ArenaConfig::default())?);
//! manager.register_provider(provider.clone(), SCRATCH, true)?;
//!
//! {
//!     let _scope = manager.begin_scope(SCRATCH)?;
//!     manager.with_allocator(SCRATCH, |allocator| allocator.allocate(256).map(drop))??;
//!     // the arena and everything allocated from it goes away with `_scope`
//! }
//! assert!(provider.is_all_freed());
//! # Ok(())
//! # }
//! ```

mod context;
pub mod flow;
mod manager;
mod provider;

use core::fmt;

pub use manager::{AllocatorScopeManager, GlobalScopeManager, ScopeHandle};
pub use provider::{AllocatorProvider, ArenaProvider, CachingProvider, NativeProvider};

/// Small integer naming a registered provider
///
/// Two values are reserved: [`ProviderId::NATIVE`] always resolves to the
/// process-wide native allocator, and [`ProviderId::INVALID`] is never
/// registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(u16);

impl ProviderId {
    /// Unscoped process-wide native allocator
    pub const NATIVE: Self = Self(0);

    /// Invalid / unset id
    pub const INVALID: Self = Self(u16::MAX);

    /// Wraps a raw id
    #[inline]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Raw id value
    #[inline]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Whether the id is one of the two reserved values
    #[inline]
    pub const fn is_reserved(self) -> bool {
        self.0 == Self::NATIVE.0 || self.0 == Self::INVALID.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NATIVE => write!(f, "{}(native)", self.0),
            Self::INVALID => write!(f, "{}(invalid)", self.0),
            Self(raw) => write!(f, "{raw}"),
        }
    }
}
