//! Global LRU list of cached runs
//!
//! Doubly-linked list stored in an index slab, ordered from most recently
//! cached (head) to least recently cached (tail). Each node is a run of
//! same-size-class blocks that became idle together, so repeated caching of
//! one size class grows a single node instead of allocating one per block.

use std::time::Instant;

pub(crate) type NodeId = usize;

#[derive(Debug, Clone)]
pub(crate) struct LruNode {
    pub size_class: usize,
    pub count: usize,
    pub cached_at: Instant,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

#[derive(Debug, Default)]
pub(crate) struct LruList {
    slots: Vec<Option<LruNode>>,
    vacant: Vec<NodeId>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
}

impl LruList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn head(&self) -> Option<NodeId> {
        self.head
    }

    pub(crate) fn tail(&self) -> Option<NodeId> {
        self.tail
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Neighbour towards the head
    pub(crate) fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|node| node.prev)
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&LruNode> {
        self.slots.get(id).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut LruNode> {
        self.slots.get_mut(id).and_then(Option::as_mut)
    }

    /// Inserts a new run of one block at the head
    pub(crate) fn push_front(&mut self, size_class: usize, now: Instant) -> NodeId {
        let node = LruNode {
            size_class,
            count: 1,
            cached_at: now,
            prev: None,
            next: self.head,
        };

        let id = match self.vacant.pop() {
            Some(id) => {
                self.slots[id] = Some(node);
                id
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };

        match self.head {
            Some(old_head) => {
                if let Some(old) = self.get_mut(old_head) {
                    old.prev = Some(id);
                }
            }
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        self.len += 1;
        id
    }

    /// Unlinks a node and frees its slot
    pub(crate) fn remove(&mut self, id: NodeId) -> Option<LruNode> {
        let node = self.slots.get_mut(id)?.take()?;

        match node.prev {
            Some(prev) => {
                if let Some(prev) = self.get_mut(prev) {
                    prev.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => {
                if let Some(next) = self.get_mut(next) {
                    next.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }

        self.vacant.push(id);
        self.len -= 1;
        Some(node)
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.vacant.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }
}
