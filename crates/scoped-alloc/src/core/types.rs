//! Common types and constants for memory management

/// Memory alignment requirements
pub mod alignment {
    /// Platform default alignment for every pointer handed to a client.
    ///
    /// Matches what `malloc` guarantees (`2 * size_of::<usize>()`), so the
    /// native allocator needs no over-aligned path.
    pub const DEFAULT_ALIGN: usize = 2 * core::mem::size_of::<usize>();
}

/// Memory size constants
pub mod size {
    /// 1 Kilobyte
    pub const KB: usize = 1024;

    /// 1 Megabyte
    pub const MB: usize = 1024 * KB;

    /// 1 Gigabyte
    pub const GB: usize = 1024 * MB;
}
