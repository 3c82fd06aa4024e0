//! Instance pool configuration

use crate::error::{MemoryError, MemoryResult};

/// Configuration for [`InstancePool`](super::InstancePool)
#[derive(Debug, Clone)]
pub struct InstancePoolConfig {
    /// Maximum number of idle instances kept for reuse
    pub max_idle: usize,

    /// Idle instances created up front
    pub pre_warm: usize,
}

impl Default for InstancePoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 64,
            pre_warm: 0,
        }
    }
}

impl InstancePoolConfig {
    /// Production configuration - keep more warm instances around
    #[must_use]
    pub fn production() -> Self {
        Self {
            max_idle: 256,
            pre_warm: 4,
        }
    }

    /// Debug configuration - small pool so leaks surface quickly
    #[must_use]
    pub fn debug() -> Self {
        Self {
            max_idle: 4,
            pre_warm: 0,
        }
    }

    /// Set the idle limit
    #[must_use = "builder methods must be chained or built"]
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// Set the number of instances created up front
    #[must_use = "builder methods must be chained or built"]
    pub fn with_pre_warm(mut self, pre_warm: usize) -> Self {
        self.pre_warm = pre_warm;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> MemoryResult<()> {
        if self.pre_warm > self.max_idle {
            return Err(MemoryError::invalid_config(
                "pre_warm must not exceed max_idle",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        assert!(InstancePoolConfig::default().validate().is_ok());
        assert!(InstancePoolConfig::production().validate().is_ok());
        assert!(InstancePoolConfig::debug().validate().is_ok());
    }

    #[test]
    fn test_pre_warm_bounded() {
        let config = InstancePoolConfig::debug().with_pre_warm(10);
        assert!(config.validate().is_err());
    }
}
