//! Flows: the unit allocator scopes are local to
//!
//! A flow is a thread by default. Its state is created on first use and
//! torn down when the thread exits or [`end_current_flow`] is called;
//! teardown releases every scope still open on it and hands its contexts
//! back to their managers.
//!
//! With the `async` feature, [`scope`] runs a future as its own flow that
//! follows the task across `.await` points and worker threads. Code that
//! runs outside such a scope falls back to the thread's flow.

use std::sync::{Arc, Weak};

use hashbrown::HashMap;
use parking_lot::Mutex;

use super::ProviderId;
use super::context::ScopeContext;
use super::manager::ManagerInner;
use crate::allocator::{AllocatorRef, ScopedAllocator};

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

mod storage {
    use std::cell::RefCell;

    use super::*;

    thread_local! {
        static THREAD_FLOW: RefCell<Option<Arc<FlowState>>> = const { RefCell::new(None) };
    }

    #[cfg(feature = "async")]
    tokio::task_local! {
        static TASK_FLOW: Arc<FlowState>;
    }

    #[cfg(feature = "async")]
    #[inline]
    fn task_flow() -> Option<Arc<FlowState>> {
        TASK_FLOW.try_with(Arc::clone).ok()
    }

    #[cfg(not(feature = "async"))]
    #[inline]
    fn task_flow() -> Option<Arc<FlowState>> {
        None
    }

    pub fn current() -> Arc<FlowState> {
        if let Some(flow) = task_flow() {
            return flow;
        }

        // During thread teardown the slot may already be gone; such late
        // callers get a flow that ends as soon as they drop it.
        THREAD_FLOW
            .try_with(|slot| {
                slot.borrow_mut()
                    .get_or_insert_with(|| Arc::new(FlowState::new()))
                    .clone()
            })
            .unwrap_or_else(|_| Arc::new(FlowState::new()))
    }

    pub fn end_thread_flow() -> bool {
        let ended = THREAD_FLOW
            .try_with(|slot| slot.borrow_mut().take())
            .ok()
            .flatten();
        ended.is_some()
    }

    #[cfg(feature = "async")]
    pub async fn with_flow<F: std::future::Future>(f: F) -> F::Output {
        TASK_FLOW.scope(Arc::new(FlowState::new()), f).await
    }

    #[cfg(feature = "async")]
    pub fn with_flow_sync<R>(f: impl FnOnce() -> R) -> R {
        TASK_FLOW.sync_scope(Arc::new(FlowState::new()), f)
    }

    #[cfg(not(feature = "async"))]
    pub fn with_flow_sync<R>(f: impl FnOnce() -> R) -> R {
        struct Restore(Option<Arc<FlowState>>);

        impl Drop for Restore {
            fn drop(&mut self) {
                let previous = self.0.take();
                let ended = THREAD_FLOW.with(|slot| slot.replace(previous));
                drop(ended);
            }
        }

        let previous = THREAD_FLOW.with(|slot| slot.replace(Some(Arc::new(FlowState::new()))));
        let _restore = Restore(previous);
        f()
    }
}

/// Ends the current thread's flow
///
/// Scopes still open on it are released and its contexts go back to their
/// managers. The next scope operation on this thread starts a new flow.
/// Returns whether there was a flow to end.
pub fn end_current_flow() -> bool {
    storage::end_thread_flow()
}

/// Runs `f` as a fresh flow that ends when `f` returns
pub fn scope_sync<R>(f: impl FnOnce() -> R) -> R {
    storage::with_flow_sync(f)
}

/// Runs a future as its own flow
///
/// The flow survives `.await` points on multi-threaded runtimes and ends
/// when the future completes or is dropped.
#[cfg(feature = "async")]
#[cfg_attr(docsrs, doc(cfg(feature = "async")))]
pub async fn scope<F: std::future::Future>(f: F) -> F::Output {
    storage::with_flow(f).await
}

pub(crate) fn current() -> Arc<FlowState> {
    storage::current()
}

// ---------------------------------------------------------------------------
// Flow state
// ---------------------------------------------------------------------------

/// Manager instance id and provider id
pub(crate) type SlotKey = (u64, ProviderId);

/// One flow's context for one provider of one manager
pub(crate) struct SlotEntry {
    pub(crate) context: ScopeContext,
    pub(crate) manager: Weak<ManagerInner>,
    /// Manager generation the context was rented in
    pub(crate) generation: u64,
}

pub(crate) struct FlowState {
    slots: Mutex<HashMap<SlotKey, SlotEntry>>,
}

impl FlowState {
    fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a scope; returns its token
    pub(crate) fn push(
        &self,
        manager: &Arc<ManagerInner>,
        id: ProviderId,
        allocator: Arc<dyn ScopedAllocator>,
    ) -> u64 {
        let generation = manager.generation();
        let mut slots = self.slots.lock();
        let entry = slots
            .entry((manager.id(), id))
            .or_insert_with(|| SlotEntry {
                context: manager.rent_context(),
                manager: Arc::downgrade(manager),
                generation,
            });

        if entry.generation != generation {
            // Scopes left over from before the manager was reset
            entry.context.release_all();
            entry.generation = generation;
        }
        entry.context.push(allocator)
    }

    /// Innermost open scope's allocator
    pub(crate) fn top(&self, key: SlotKey, generation: u64) -> Option<AllocatorRef> {
        let slots = self.slots.lock();
        slots
            .get(&key)
            .filter(|entry| entry.generation == generation)
            .and_then(|entry| entry.context.top())
    }

    pub(crate) fn allocator(&self, key: SlotKey, token: u64) -> Option<AllocatorRef> {
        self.slots.lock().get(&key)?.context.get(token)
    }

    pub(crate) fn depth(&self, key: SlotKey, generation: u64) -> usize {
        self.slots
            .lock()
            .get(&key)
            .filter(|entry| entry.generation == generation)
            .map_or(0, |entry| entry.context.depth())
    }

    /// Releases scope `token` and everything opened after it
    pub(crate) fn release_scope(&self, key: SlotKey, token: u64) -> usize {
        self.slots
            .lock()
            .get_mut(&key)
            .map_or(0, |entry| entry.context.release_from(token))
    }

    pub(crate) fn free_all(&self, key: SlotKey) {
        if let Some(entry) = self.slots.lock().get(&key) {
            entry.context.free_all();
        }
    }

    pub(crate) fn take(&self, key: SlotKey) -> Option<SlotEntry> {
        self.slots.lock().remove(&key)
    }

    /// Removes every slot belonging to manager `manager_id`
    pub(crate) fn take_manager(&self, manager_id: u64) -> Vec<SlotEntry> {
        self.slots
            .lock()
            .extract_if(|&(owner, _), _| owner == manager_id)
            .map(|(_, entry)| entry)
            .collect()
    }
}

impl Drop for FlowState {
    fn drop(&mut self) {
        for (_, entry) in self.slots.get_mut().drain() {
            match entry.manager.upgrade() {
                Some(manager) => manager.return_context(entry.context, entry.generation),
                None => {
                    let mut context = entry.context;
                    context.release_all();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_thread_flow_is_reused_until_ended() {
        thread::spawn(|| {
            let a = current();
            let b = current();
            assert!(Arc::ptr_eq(&a, &b));
            drop((a, b));

            assert!(end_current_flow());
            assert!(!end_current_flow());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_scope_sync_is_a_separate_flow() {
        thread::spawn(|| {
            let outer = current();
            scope_sync(|| {
                let inner = current();
                assert!(!Arc::ptr_eq(&outer, &inner));
            });
            assert!(Arc::ptr_eq(&outer, &current()));
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_threads_are_distinct_flows() {
        let here = current();
        let there = thread::spawn(|| Arc::as_ptr(&current()) as usize)
            .join()
            .unwrap();
        assert_ne!(Arc::as_ptr(&here) as usize, there);
    }
}
