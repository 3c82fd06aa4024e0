//! Thread-safe instance pool
//!
//! A mutex-protected LIFO stack of idle instances. `get` pops or
//! constructs, `put` resets and pushes. An instance is owned by exactly one
//! caller between `get` and `put`.

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::{InstancePoolConfig, Poolable};

/// Shared pool of reusable instances
///
/// # Example
/// ```
/// use scoped_alloc::pool::InstancePool;
///
/// let pool = InstancePool::new(|| Vec::<u8>::with_capacity(1024));
///
/// let mut buffer = pool.get();
/// buffer.extend_from_slice(b"hello");
/// pool.put(buffer);
///
/// // Returned buffers come back cleared
/// assert!(pool.get().is_empty());
/// ```
pub struct InstancePool<T: Poolable> {
    idle: Mutex<Vec<T>>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    config: InstancePoolConfig,
    closed: AtomicBool,
    created: AtomicUsize,
    reused: AtomicUsize,
}

impl<T: Poolable> InstancePool<T> {
    /// Create new pool with factory function
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_config(InstancePoolConfig::default(), factory)
    }

    /// Create pool with custom configuration
    ///
    /// The configuration is expected to be [validated](InstancePoolConfig::validate)
    /// by the caller.
    pub fn with_config<F>(config: InstancePoolConfig, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let idle: Vec<T> = (0..config.pre_warm).map(|_| factory()).collect();
        let created = idle.len();

        Self {
            idle: Mutex::new(idle),
            factory: Box::new(factory),
            config,
            closed: AtomicBool::new(false),
            created: AtomicUsize::new(created),
            reused: AtomicUsize::new(0),
        }
    }

    /// Take an idle instance, or construct a new one
    pub fn get(&self) -> T {
        if let Some(instance) = self.idle.lock().pop() {
            self.reused.fetch_add(1, Ordering::Relaxed);
            return instance;
        }

        self.created.fetch_add(1, Ordering::Relaxed);
        (self.factory)()
    }

    /// Return an instance to the pool
    ///
    /// The instance is reset first. It is dropped instead of kept when the
    /// pool is full, closed, or the instance is no longer reusable.
    pub fn put(&self, mut instance: T) {
        if self.closed.load(Ordering::Acquire) || !instance.is_reusable() {
            return;
        }

        instance.reset();

        let mut idle = self.idle.lock();
        if idle.len() < self.config.max_idle {
            idle.push(instance);
        }
    }

    /// Drop every idle instance
    pub fn clear(&self) {
        let drained = core::mem::take(&mut *self.idle.lock());
        drop(drained);
    }

    /// Drop every idle instance and stop accepting returns
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.clear();
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Get number of idle instances
    #[must_use]
    pub fn idle_len(&self) -> usize {
        self.idle.lock().len()
    }

    /// Instances constructed by the factory so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Instances handed out from the idle stack so far
    pub fn reused(&self) -> usize {
        self.reused.load(Ordering::Relaxed)
    }

    /// Visit every idle instance under the pool lock
    pub(crate) fn for_each_idle(&self, mut f: impl FnMut(&T)) {
        for instance in self.idle.lock().iter() {
            f(instance);
        }
    }
}

impl<T: Poolable> fmt::Debug for InstancePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstancePool")
            .field("idle", &self.idle_len())
            .field("max_idle", &self.config.max_idle)
            .field("created", &self.created())
            .field("reused", &self.reused())
            .field("closed", &self.is_closed())
            .finish()
    }
}
