//! Configuration for the allocation pooling cache

use std::time::Duration;

use crate::core::size::{KB, MB};
use crate::error::{MemoryError, MemoryResult};

/// Configuration for [`AllocationPoolingCache`](super::AllocationPoolingCache)
#[derive(Debug, Clone)]
pub struct PoolingCacheConfig {
    /// TTL every size class starts with
    pub initial_ttl: Duration,
    /// Amount a TTL shrinks by after a window without misses
    pub ttl_step: Duration,
    /// Upper bound for any size class's TTL
    pub max_ttl: Duration,
    /// Number of reuse outcomes in each size class's sliding window
    pub window_len: usize,
    /// Cached bytes above which `free` prunes before caching
    pub cleanup_threshold: usize,
    /// Largest size class that is cached at all
    pub max_item_size: usize,
    /// Consecutive futile prunes before the cleanup threshold is raised
    pub max_prune_failures: u32,
}

impl Default for PoolingCacheConfig {
    fn default() -> Self {
        Self {
            initial_ttl: Duration::from_secs(10),
            ttl_step: Duration::from_millis(250),
            max_ttl: Duration::from_secs(300),
            window_len: 32,
            cleanup_threshold: 64 * MB,
            max_item_size: MB,
            max_prune_failures: 8,
        }
    }
}

impl PoolingCacheConfig {
    /// Production configuration - generous retention
    #[must_use]
    pub fn production() -> Self {
        Self {
            cleanup_threshold: 256 * MB,
            max_item_size: 4 * MB,
            ..Default::default()
        }
    }

    /// Debug configuration - small footprint, fast adaptation
    #[must_use]
    pub fn debug() -> Self {
        Self {
            initial_ttl: Duration::from_millis(100),
            ttl_step: Duration::from_millis(10),
            max_ttl: Duration::from_secs(5),
            window_len: 8,
            cleanup_threshold: 256 * KB,
            max_item_size: 64 * KB,
            max_prune_failures: 2,
        }
    }

    /// Set the TTL new size classes start with
    #[must_use = "builder methods must be chained or built"]
    pub fn with_initial_ttl(mut self, ttl: Duration) -> Self {
        self.initial_ttl = ttl;
        self
    }

    /// Set the TTL decay step
    #[must_use = "builder methods must be chained or built"]
    pub fn with_ttl_step(mut self, step: Duration) -> Self {
        self.ttl_step = step;
        self
    }

    /// Set the TTL ceiling
    #[must_use = "builder methods must be chained or built"]
    pub fn with_max_ttl(mut self, max_ttl: Duration) -> Self {
        self.max_ttl = max_ttl;
        self
    }

    /// Set the sliding window length
    #[must_use = "builder methods must be chained or built"]
    pub fn with_window_len(mut self, window_len: usize) -> Self {
        self.window_len = window_len;
        self
    }

    /// Set the cleanup threshold in bytes
    #[must_use = "builder methods must be chained or built"]
    pub fn with_cleanup_threshold(mut self, bytes: usize) -> Self {
        self.cleanup_threshold = bytes;
        self
    }

    /// Set the largest cached size class
    #[must_use = "builder methods must be chained or built"]
    pub fn with_max_item_size(mut self, bytes: usize) -> Self {
        self.max_item_size = bytes;
        self
    }

    /// Set the number of futile prunes tolerated before raising the threshold
    #[must_use = "builder methods must be chained or built"]
    pub fn with_max_prune_failures(mut self, failures: u32) -> Self {
        self.max_prune_failures = failures;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> MemoryResult<()> {
        if self.window_len == 0 {
            return Err(MemoryError::invalid_config("window_len must be non-zero"));
        }

        if self.ttl_step.is_zero() {
            return Err(MemoryError::invalid_config("ttl_step must be non-zero"));
        }

        if self.initial_ttl > self.max_ttl {
            return Err(MemoryError::invalid_config(
                "initial_ttl must not exceed max_ttl",
            ));
        }

        if self.max_prune_failures == 0 {
            return Err(MemoryError::invalid_config(
                "max_prune_failures must be non-zero",
            ));
        }

        Ok(())
    }
}
