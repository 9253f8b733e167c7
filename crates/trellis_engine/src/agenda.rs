//! Pending activations of one working memory.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};

use trellis_foundation::{FactHandle, NodeId};
use trellis_network::Activation;

/// Activations waiting to fire, highest salience first, then in the order
/// they were created.
#[derive(Debug, Default)]
pub struct Agenda {
    queue: BTreeMap<(Reverse<i32>, u64), Activation>,
    next: u64,
}

impl Agenda {
    /// Creates an empty agenda.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules an activation.
    pub fn push(&mut self, activation: Activation) {
        self.next += 1;
        self.queue
            .insert((Reverse(activation.salience), self.next), activation);
    }

    /// Removes and returns the next activation to fire.
    pub fn pop(&mut self) -> Option<Activation> {
        self.queue.pop_first().map(|(_, activation)| activation)
    }

    /// Cancels every activation of a fact. Returns how many were removed.
    pub fn cancel_handle(&mut self, handle: FactHandle) -> usize {
        self.cancel(|activation| activation.handle == handle)
    }

    /// Cancels every activation produced by the given nodes.
    pub fn cancel_nodes(&mut self, nodes: &HashSet<NodeId>) -> usize {
        self.cancel(|activation| nodes.contains(&activation.node))
    }

    fn cancel(&mut self, matches: impl Fn(&Activation) -> bool) -> usize {
        let before = self.queue.len();
        self.queue.retain(|_, activation| !matches(activation));
        before - self.queue.len()
    }

    /// Returns the pending activations in firing order.
    pub fn iter(&self) -> impl Iterator<Item = &Activation> {
        self.queue.values()
    }

    /// Returns the number of pending activations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drops every pending activation.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
