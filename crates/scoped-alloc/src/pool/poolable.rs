//! Trait for objects that can be pooled

/// Trait for objects that can be pooled
///
/// # Example
/// ```
/// use scoped_alloc::pool::Poolable;
///
/// struct Scratch {
///     buffer: Vec<u8>,
/// }
///
/// impl Poolable for Scratch {
///     fn reset(&mut self) {
///         self.buffer.clear();
///     }
///
///     fn is_reusable(&self) -> bool {
///         self.buffer.capacity() < 1_000_000 // Don't reuse huge buffers
///     }
/// }
/// ```
pub trait Poolable: Send + 'static {
    /// Reset object to initial state
    ///
    /// This method is called when an object is returned to the pool.
    /// It should clear any state that shouldn't persist between uses.
    fn reset(&mut self);

    /// Check if object is reusable
    ///
    /// Return false if the object should be discarded instead of pooled.
    fn is_reusable(&self) -> bool {
        true
    }
}

impl<T: Send + 'static> Poolable for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }
}
