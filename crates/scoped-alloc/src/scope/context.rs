//! Per-flow, per-provider scope stack

use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::allocator::{AllocatorRef, ScopedAllocator};

static NEXT_SCOPE_TOKEN: AtomicU64 = AtomicU64::new(1);

struct ScopeEntry {
    token: u64,
    allocator: Arc<dyn ScopedAllocator>,
}

/// Stack of scoped allocators one flow has open on one provider
///
/// Contexts are pooled by the manager. A context only ever goes back to the
/// pool empty.
#[derive(Default)]
pub(crate) struct ScopeContext {
    stack: Vec<ScopeEntry>,
}

impl ScopeContext {
    /// Pushes a scope; returns the token identifying it
    pub(crate) fn push(&mut self, allocator: Arc<dyn ScopedAllocator>) -> u64 {
        let token = NEXT_SCOPE_TOKEN.fetch_add(1, Ordering::Relaxed);
        self.stack.push(ScopeEntry { token, allocator });
        token
    }

    pub(crate) fn top(&self) -> Option<AllocatorRef> {
        self.stack
            .last()
            .map(|entry| -> AllocatorRef { entry.allocator.clone() })
    }

    pub(crate) fn get(&self, token: u64) -> Option<AllocatorRef> {
        self.stack
            .iter()
            .find(|entry| entry.token == token)
            .map(|entry| -> AllocatorRef { entry.allocator.clone() })
    }

    pub(crate) fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Releases the scope `token` and every scope opened after it
    ///
    /// Returns how many scopes were released; zero when `token` is no longer
    /// open.
    pub(crate) fn release_from(&mut self, token: u64) -> usize {
        let Some(position) = self.stack.iter().position(|entry| entry.token == token) else {
            return 0;
        };
        let released = self.stack.len() - position;
        self.truncate(position);
        released
    }

    /// Frees every allocation in every open scope, keeping the scopes open
    pub(crate) fn free_all(&self) {
        for entry in &self.stack {
            entry.allocator.free_all_allocations();
        }
    }

    /// Releases every open scope
    pub(crate) fn release_all(&mut self) -> usize {
        let released = self.stack.len();
        self.truncate(0);
        released
    }

    /// Innermost scopes are released first
    fn truncate(&mut self, len: usize) {
        while self.stack.len() > len {
            if let Some(entry) = self.stack.pop() {
                entry.allocator.release();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{Allocator, NativeAllocator};
    use crate::arena::ArenaAllocator;

    fn arena() -> Arc<dyn ScopedAllocator> {
        Arc::new(ArenaAllocator::new(NativeAllocator::shared()))
    }

    #[test]
    fn test_push_and_top() {
        let mut context = ScopeContext::default();
        assert!(context.top().is_none());

        let outer = context.push(arena());
        let inner = context.push(arena());
        assert_eq!(context.depth(), 2);
        assert!(context.get(outer).is_some());

        let top = context.top().unwrap();
        let from_token = context.get(inner).unwrap();
        assert!(Arc::ptr_eq(&top, &from_token));
        drop((top, from_token));

        assert_eq!(context.release_all(), 2);
        assert_eq!(context.depth(), 0);
    }

    #[test]
    fn test_release_from_closes_inner_scopes() {
        let mut context = ScopeContext::default();
        let first = context.push(arena());
        let second = context.push(arena());
        context.push(arena());

        assert_eq!(context.release_from(second), 2);
        assert_eq!(context.depth(), 1);

        // Already gone
        assert_eq!(context.release_from(second), 0);
        assert_eq!(context.release_from(first), 1);
    }

    #[test]
    fn test_free_all_keeps_scopes_open() {
        let mut context = ScopeContext::default();
        context.push(arena());
        context.top().unwrap().allocate(64).unwrap();

        context.free_all();
        assert_eq!(context.depth(), 1);
        context.release_all();
    }
}
