//! Standalone error types for scoped-alloc
//!
//! Uses thiserror for clean, idiomatic Rust error definitions.
//!
//! Only recoverable conditions live here. Corruption-class contract
//! violations (a pointer freed into the wrong arena, one arena driven from
//! two flows at once) panic at the call site instead.

use thiserror::Error;

use crate::macros::mem_error;
use crate::scope::ProviderId;

// ============================================================================
// Main Error Types
// ============================================================================

/// Memory management errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    // --- Allocation Errors ---
    #[error("Memory allocation failed: {size} bytes")]
    AllocationFailed { size: usize },

    #[error("Size overflow during operation: {operation}")]
    SizeOverflow { operation: String },

    // --- Configuration Errors ---
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // --- Provider Registry Errors ---
    #[error("Allocator provider {id} not found")]
    ProviderNotFound { id: ProviderId },

    #[error("Allocator provider {id} is already registered")]
    DuplicateProvider { id: ProviderId },

    #[error("Provider id {id} is reserved")]
    ReservedProviderId { id: ProviderId },

    #[error("Provider configuration already finalized")]
    AlreadyFinalized,

    // --- Scope Errors ---
    #[error("Allocator provider {id} is unscoped and cannot open scopes")]
    ProviderNotScoped { id: ProviderId },

    #[error("No allocator set for this context (provider {id})")]
    NoAllocatorInScope { id: ProviderId },

    // --- Feature Support Errors ---
    #[error("Operation not supported: {operation}")]
    NotSupported { operation: &'static str },
}

impl MemoryError {
    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AllocationFailed { .. })
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AllocationFailed { .. } => "MEM:ALLOC:FAILED",
            Self::SizeOverflow { .. } => "MEM:ALLOC:OVERFLOW",
            Self::InvalidConfig { .. } => "MEM:CONFIG:INVALID",
            Self::ProviderNotFound { .. } => "MEM:PROVIDER:NOT_FOUND",
            Self::DuplicateProvider { .. } => "MEM:PROVIDER:DUPLICATE",
            Self::ReservedProviderId { .. } => "MEM:PROVIDER:RESERVED",
            Self::AlreadyFinalized => "MEM:PROVIDER:FINALIZED",
            Self::ProviderNotScoped { .. } => "MEM:SCOPE:UNSCOPED",
            Self::NoAllocatorInScope { .. } => "MEM:SCOPE:EMPTY",
            Self::NotSupported { .. } => "MEM:FEATURE:UNSUPPORTED",
        }
    }

    // ============================================================================
    // Convenience Constructors
    // ============================================================================

    /// Create allocation failed error
    pub fn allocation_failed(size: usize) -> Self {
        mem_error!(size, "native allocation failed");

        Self::AllocationFailed { size }
    }

    /// Create size overflow error
    pub fn size_overflow(operation: &str) -> Self {
        Self::SizeOverflow {
            operation: operation.to_string(),
        }
    }

    /// Create invalid config error
    pub fn invalid_config(reason: &str) -> Self {
        Self::InvalidConfig {
            reason: reason.to_string(),
        }
    }

    /// Create provider not found error
    pub fn provider_not_found(id: ProviderId) -> Self {
        Self::ProviderNotFound { id }
    }

    /// Create not supported error
    pub fn not_supported(operation: &'static str) -> Self {
        Self::NotSupported { operation }
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result type for memory operations
pub type MemoryResult<T> = core::result::Result<T, MemoryError>;

/// Generic result type alias
pub type Result<T> = MemoryResult<T>;

/// Type aliases used by the allocator modules
pub type AllocError = MemoryError;
pub type AllocResult<T> = MemoryResult<T>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_error_creation() {
        let error = MemoryError::allocation_failed(1024);
        assert!(error.to_string().contains("1024"));
    }

    #[test]
    fn test_provider_errors_mention_id() {
        let error = MemoryError::provider_not_found(ProviderId::new(7));
        assert!(error.to_string().contains('7'));

        let error = MemoryError::NoAllocatorInScope {
            id: ProviderId::new(3),
        };
        assert!(error.to_string().contains("No allocator set"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(MemoryError::allocation_failed(8).code(), "MEM:ALLOC:FAILED");
        assert_eq!(
            MemoryError::AlreadyFinalized.code(),
            "MEM:PROVIDER:FINALIZED"
        );
        assert_eq!(
            MemoryError::size_overflow("page size").code(),
            "MEM:ALLOC:OVERFLOW"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(MemoryError::allocation_failed(100).is_retryable());
        assert!(!MemoryError::AlreadyFinalized.is_retryable());
        assert!(!MemoryError::invalid_config("zero page").is_retryable());
    }
}
