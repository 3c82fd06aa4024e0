//! Crate-internal logging macros
//!
//! Thin wrappers over `tracing` that compile to nothing without the
//! `logging` feature, so call sites don't need their own `cfg` guards.

macro_rules! mem_trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "logging")]
        ::tracing::trace!(target: "scoped_alloc", $($arg)*);
    };
}

macro_rules! mem_debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "logging")]
        ::tracing::debug!(target: "scoped_alloc", $($arg)*);
    };
}

macro_rules! mem_info {
    ($($arg:tt)*) => {
        #[cfg(feature = "logging")]
        ::tracing::info!(target: "scoped_alloc", $($arg)*);
    };
}

macro_rules! mem_warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "logging")]
        ::tracing::warn!(target: "scoped_alloc", $($arg)*);
    };
}

macro_rules! mem_error {
    ($($arg:tt)*) => {
        #[cfg(feature = "logging")]
        ::tracing::error!(target: "scoped_alloc", $($arg)*);
    };
}

pub(crate) use {mem_debug, mem_error, mem_info, mem_trace, mem_warn};
