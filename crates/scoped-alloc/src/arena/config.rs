//! Arena configuration

use crate::allocator::header::{ArenaHeader, BlockHeader};
use crate::core::alignment::DEFAULT_ALIGN;
use crate::core::size::KB;
use crate::error::{MemoryError, MemoryResult};

/// Configuration for [`ArenaAllocator`](super::ArenaAllocator)
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    /// Size of a regular page drawn from the inner allocator
    ///
    /// Requests larger than this get a page of their own, rounded up to a
    /// multiple of this size.
    pub page_size: usize,

    /// Zero every fresh page before handing memory out of it
    pub zero_pages: bool,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            page_size: 64 * KB,
            zero_pages: cfg!(debug_assertions),
        }
    }
}

impl ArenaConfig {
    /// Create a configuration with the given page size
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            ..Default::default()
        }
    }

    /// Production configuration - large pages, no zeroing
    #[must_use]
    pub fn production() -> Self {
        Self {
            page_size: 256 * KB,
            zero_pages: false,
        }
    }

    /// Debug configuration - small pages so growth paths are exercised
    #[must_use]
    pub fn debug() -> Self {
        Self {
            page_size: 4 * KB,
            zero_pages: true,
        }
    }

    /// Set the page size
    #[must_use = "builder methods must be chained or built"]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Enable or disable zeroing of fresh pages
    #[must_use = "builder methods must be chained or built"]
    pub fn with_zero_pages(mut self, zero_pages: bool) -> Self {
        self.zero_pages = zero_pages;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> MemoryResult<()> {
        if self.page_size % DEFAULT_ALIGN != 0 {
            return Err(MemoryError::invalid_config(
                "page_size must be a multiple of the default alignment",
            ));
        }

        if self.page_size <= ArenaHeader::OVERHEAD {
            return Err(MemoryError::invalid_config(
                "page_size must leave room for at least one block",
            ));
        }

        Ok(())
    }
}
