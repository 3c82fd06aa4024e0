//! Instance pooling
//!
//! Recycles expensive-to-build objects (arenas, mostly) instead of
//! constructing one per scope.

mod config;
mod instance_pool;
mod poolable;

pub use config::InstancePoolConfig;
pub use instance_pool::InstancePool;
pub use poolable::Poolable;
