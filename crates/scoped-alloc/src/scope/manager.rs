//! Allocator scope manager
//!
//! The manager owns the provider registry and a pool of idle scope
//! contexts. Registration happens up front; the registry is frozen by
//! [`finalize_configuration`](AllocatorScopeManager::finalize_configuration)
//! (or lazily by the first scope operation) and read lock-free afterwards.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use arc_swap::ArcSwapOption;
use hashbrown::HashMap;
use parking_lot::Mutex;

use super::context::ScopeContext;
use super::flow::{self, FlowState, SlotKey};
use super::{AllocatorProvider, ProviderId};
use crate::allocator::{Allocator, AllocatorRef, NativeAllocator};
use crate::error::{MemoryError, MemoryResult};
use crate::macros::{mem_debug, mem_info, mem_trace, mem_warn};

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
struct Registration {
    provider: Arc<dyn AllocatorProvider>,
    scoped: bool,
}

type Registry = HashMap<ProviderId, Registration>;

pub(crate) struct ManagerInner {
    id: u64,
    /// Registrations made before finalization
    pending: Mutex<Registry>,
    /// Frozen registry; `None` while unconfigured
    registry: ArcSwapOption<Registry>,
    /// Idle contexts, all empty and interchangeable
    contexts: Mutex<Vec<ScopeContext>>,
    generation: AtomicU64,
}

impl ManagerInner {
    fn new() -> Self {
        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            pending: Mutex::new(Registry::new()),
            registry: ArcSwapOption::empty(),
            contexts: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn rent_context(&self) -> ScopeContext {
        self.contexts.lock().pop().unwrap_or_default()
    }

    /// Takes back a context whose flow association ended
    ///
    /// Open scopes are force-released. Contexts rented before the last reset
    /// are dropped instead of pooled.
    pub(crate) fn return_context(&self, mut context: ScopeContext, generation: u64) {
        let released = context.release_all();
        if released > 0 {
            mem_debug!(
                manager = self.id,
                released,
                "flow context returned with scopes still open"
            );
        }

        if generation == self.generation() {
            let mut contexts = self.contexts.lock();
            contexts.push(context);
            mem_trace!(manager = self.id, pooled = contexts.len(), "context pooled");
        }
    }

    /// Frozen registry, finalizing on first use
    fn registry(&self) -> Arc<Registry> {
        if let Some(registry) = self.registry.load_full() {
            return registry;
        }

        let mut pending = self.pending.lock();
        if let Some(registry) = self.registry.load_full() {
            return registry;
        }
        self.freeze(&mut pending)
    }

    /// Publishes the pending registrations; caller holds the `pending` lock
    fn freeze(&self, pending: &mut Registry) -> Arc<Registry> {
        let registry = Arc::new(core::mem::take(pending));
        self.registry.store(Some(registry.clone()));
        mem_info!(
            manager = self.id,
            providers = registry.len(),
            "allocator providers finalized"
        );
        registry
    }

    fn lookup(&self, id: ProviderId) -> MemoryResult<Registration> {
        self.registry()
            .get(&id)
            .cloned()
            .ok_or_else(|| MemoryError::provider_not_found(id))
    }

    #[inline]
    fn key(&self, id: ProviderId) -> SlotKey {
        (self.id, id)
    }
}

/// Tracks "the current allocator" per flow and provider
///
/// Cloning is cheap and yields a handle to the same manager.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use scoped_alloc::allocator::Allocator;
/// use scoped_alloc::arena::ArenaConfig;
/// use scoped_alloc::scope::{AllocatorScopeManager, ArenaProvider, ProviderId};
///
/// let manager = AllocatorScopeManager::new();
/// let id = ProviderId::new(1);
/// manager
///     .register_provider(Arc::new(ArenaProvider::new(ArenaConfig::default()).unwrap()), id, true)
///     .unwrap();
///
/// let outer = manager.begin_scope(id).unwrap();
/// let inner = manager.begin_scope(id).unwrap();
/// assert_eq!(manager.scope_depth(id), 2);
///
/// drop(inner);
/// drop(outer);
/// assert_eq!(manager.scope_depth(id), 0);
/// ```
#[derive(Clone)]
pub struct AllocatorScopeManager {
    inner: Arc<ManagerInner>,
}

impl Default for AllocatorScopeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AllocatorScopeManager {
    /// Creates an unconfigured manager
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ManagerInner::new()),
        }
    }

    /// Registers `provider` under `id`
    ///
    /// Scoped providers hand out one allocator per [`begin_scope`]; unscoped
    /// providers expose a single shared allocator.
    ///
    /// [`begin_scope`]: Self::begin_scope
    pub fn register_provider(
        &self,
        provider: Arc<dyn AllocatorProvider>,
        id: ProviderId,
        scoped: bool,
    ) -> MemoryResult<()> {
        if id.is_reserved() {
            return Err(MemoryError::ReservedProviderId { id });
        }

        let mut pending = self.inner.pending.lock();
        if self.inner.registry.load().is_some() {
            return Err(MemoryError::AlreadyFinalized);
        }
        if pending.contains_key(&id) {
            return Err(MemoryError::DuplicateProvider { id });
        }

        pending.insert(id, Registration { provider, scoped });
        mem_debug!(manager = self.inner.id, %id, scoped, "allocator provider registered");
        Ok(())
    }

    /// Freezes the registry
    ///
    /// Fails if already configured. Scope operations finalize implicitly, so
    /// calling this is only needed to fail fast on late registrations.
    pub fn finalize_configuration(&self) -> MemoryResult<()> {
        let mut pending = self.inner.pending.lock();
        if self.inner.registry.load().is_some() {
            return Err(MemoryError::AlreadyFinalized);
        }
        self.inner.freeze(&mut pending);
        Ok(())
    }

    /// Whether the registry has been finalized
    pub fn is_configured(&self) -> bool {
        self.inner.registry.load().is_some()
    }

    /// Opens a scope on a scoped provider for the current flow
    ///
    /// The provider's allocator becomes current for `id` until the returned
    /// handle is dropped.
    pub fn begin_scope(&self, id: ProviderId) -> MemoryResult<ScopeHandle> {
        if id == ProviderId::NATIVE {
            return Err(MemoryError::ProviderNotScoped { id });
        }

        let registration = self.inner.lookup(id)?;
        if !registration.scoped {
            return Err(MemoryError::ProviderNotScoped { id });
        }

        let allocator = registration.provider.create_scoped()?;
        let flow = flow::current();
        let token = flow.push(&self.inner, id, allocator);
        mem_trace!(manager = self.inner.id, %id, token, "scope opened");

        Ok(ScopeHandle {
            flow: Arc::downgrade(&flow),
            key: self.inner.key(id),
            token,
            active: true,
        })
    }

    /// The allocator currently in effect for `id` on this flow
    ///
    /// [`ProviderId::NATIVE`] always yields the shared native allocator.
    /// Scoped providers yield their innermost open scope's allocator.
    /// Unscoped providers yield their shared allocator.
    ///
    /// The returned reference should not outlive the scope it came from;
    /// prefer [`with_allocator`](Self::with_allocator) for short uses.
    pub fn current_allocator(&self, id: ProviderId) -> MemoryResult<AllocatorRef> {
        if id == ProviderId::NATIVE {
            return Ok(NativeAllocator::shared());
        }

        let registration = self.inner.lookup(id)?;
        if !registration.scoped {
            return registration
                .provider
                .shared()
                .ok_or_else(|| MemoryError::not_supported("shared allocator"));
        }

        flow::current()
            .top(self.inner.key(id), self.inner.generation())
            .ok_or(MemoryError::NoAllocatorInScope { id })
    }

    /// Runs `f` with the allocator currently in effect for `id`
    pub fn with_allocator<F, R>(&self, id: ProviderId, f: F) -> MemoryResult<R>
    where
        F: FnOnce(&dyn Allocator) -> R,
    {
        let allocator = self.current_allocator(id)?;
        Ok(f(&*allocator))
    }

    /// Frees everything allocated in this flow's open scopes for `id` and
    /// clears the provider's cache
    ///
    /// The scopes themselves stay open.
    pub fn free_allocations(&self, id: ProviderId) -> MemoryResult<()> {
        let registration = self.inner.lookup(id)?;
        if registration.scoped {
            flow::current().free_all(self.inner.key(id));
        }
        registration.provider.clear_cache();
        Ok(())
    }

    /// Ends this flow's association with its context for `id`
    ///
    /// Open scopes are force-released and the context goes back to the
    /// pool. Handles for those scopes become inert.
    pub fn clear_flow(&self, id: ProviderId) -> MemoryResult<()> {
        self.inner.lookup(id)?;
        if let Some(entry) = flow::current().take(self.inner.key(id)) {
            self.inner.return_context(entry.context, entry.generation);
        }
        Ok(())
    }

    /// Forgets every provider and returns the manager to unconfigured
    ///
    /// This flow's contexts are force-released, every provider is disposed,
    /// and the context pool is drained. Contexts still held by other live
    /// flows are force-released when those flows return them.
    pub fn clear_providers_and_allocations(&self) {
        let registry = {
            let mut pending = self.inner.pending.lock();
            let frozen = self.inner.registry.swap(None);
            let pending = core::mem::take(&mut *pending);
            self.inner.generation.fetch_add(1, Ordering::AcqRel);
            frozen.map_or(pending, Arc::unwrap_or_clone)
        };

        for mut entry in flow::current().take_manager(self.inner.id) {
            entry.context.release_all();
        }
        for registration in registry.values() {
            registration.provider.dispose();
        }

        let drained = core::mem::take(&mut *self.inner.contexts.lock());
        for mut context in drained {
            context.release_all();
        }

        mem_info!(
            manager = self.inner.id,
            providers = registry.len(),
            "allocator providers cleared"
        );
    }

    /// Idle contexts waiting in the shared pool
    pub fn context_pool_len(&self) -> usize {
        self.inner.contexts.lock().len()
    }

    /// Number of scopes this flow has open on `id`
    pub fn scope_depth(&self, id: ProviderId) -> usize {
        flow::current().depth(self.inner.key(id), self.inner.generation())
    }
}

impl fmt::Debug for AllocatorScopeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocatorScopeManager")
            .field("id", &self.inner.id)
            .field("configured", &self.is_configured())
            .field("generation", &self.inner.generation())
            .field("pooled_contexts", &self.context_pool_len())
            .finish()
    }
}

/// Guard for an open scope
///
/// Dropping it releases the scope's allocator, and any scopes opened on the
/// same provider after it that are still open. A handle whose flow has
/// already ended does nothing.
#[must_use = "the scope ends as soon as the handle is dropped"]
pub struct ScopeHandle {
    flow: Weak<FlowState>,
    key: SlotKey,
    token: u64,
    active: bool,
}

impl ScopeHandle {
    /// Provider this scope was opened on
    pub fn provider_id(&self) -> ProviderId {
        self.key.1
    }

    /// This scope's allocator, while the scope is open
    pub fn allocator(&self) -> Option<AllocatorRef> {
        self.flow.upgrade()?.allocator(self.key, self.token)
    }

    /// Leaves the scope open until its flow ends
    pub fn leak(mut self) {
        self.active = false;
    }
}

impl Drop for ScopeHandle {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let Some(flow) = self.flow.upgrade() else {
            return;
        };

        let released = flow.release_scope(self.key, self.token);
        if released > 1 {
            mem_warn!(
                provider = %self.key.1,
                released,
                "scope ended out of order; inner scopes released with it"
            );
        }
    }
}

impl fmt::Debug for ScopeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeHandle")
            .field("provider", &self.key.1)
            .field("token", &self.token)
            .field("active", &self.active)
            .finish()
    }
}

static GLOBAL_MANAGER: OnceLock<AllocatorScopeManager> = OnceLock::new();

/// Process-wide scope manager
pub struct GlobalScopeManager;

impl GlobalScopeManager {
    /// Gets the global manager, creating it on first use
    pub fn get() -> &'static AllocatorScopeManager {
        GLOBAL_MANAGER.get_or_init(AllocatorScopeManager::new)
    }

    /// Gets the global manager if something already created it
    pub fn try_get() -> Option<&'static AllocatorScopeManager> {
        GLOBAL_MANAGER.get()
    }
}
