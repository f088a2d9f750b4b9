//! ---
//! rchan_section: "07-resilience-fault-tolerance"
//! rchan_subsection: "module"
//! rchan_type: "source"
//! rchan_scope: "code"
//! rchan_description: "Channel registry, health monitoring, and failover coordinators."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---
use std::collections::VecDeque;

/// Bounded FIFO of recently fetched payloads; the oldest entry is evicted
/// once capacity is exceeded.
#[derive(Debug, Clone)]
pub struct DataBuffer<P> {
    capacity: usize,
    items: VecDeque<P>,
}

impl<P: Clone> DataBuffer<P> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a payload, returning the evicted one when the buffer was full.
    pub fn push(&mut self, item: P) -> Option<P> {
        self.items.push_back(item);
        if self.items.len() > self.capacity {
            self.items.pop_front()
        } else {
            None
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Contents in arrival order, oldest first.
    pub fn to_vec(&self) -> Vec<P> {
        self.items.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
