//! Allocation pooling cache
//!
//! Size-classed recycling of freed blocks with a global LRU list and a
//! per-size-class TTL that adapts to observed reuse.

mod config;
mod lru;
mod pooling;
mod size_class;
mod ttl;

pub use config::PoolingCacheConfig;
pub use pooling::{AllocationPoolingCache, CacheStats};
