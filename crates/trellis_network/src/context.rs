//! Propagation contexts: immutable records of one lifecycle event.

use trellis_foundation::{EntryPointId, FactHandle, Operation};

/// Kind of lifecycle event being propagated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropagationKind {
    /// A new fact enters the network.
    Assertion,
    /// A fact leaves the network.
    Retraction,
    /// A fact is replaced in place, keeping its handle.
    Modification,
}

impl PropagationKind {
    /// Returns the operation reported in errors for this kind.
    #[must_use]
    pub fn operation(self) -> Operation {
        match self {
            Self::Assertion => Operation::Assert,
            Self::Retraction => Operation::Retract,
            Self::Modification => Operation::Modify,
        }
    }
}

/// Describes one lifecycle event.
///
/// Contexts are issued by an entry point's ordering guard, which stamps a
/// sequence number strictly greater than every earlier one on that entry
/// point. A context is never mutated after creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropagationContext {
    kind: PropagationKind,
    entry_point: EntryPointId,
    sequence: u64,
    handle: FactHandle,
}

impl PropagationContext {
    /// Creates a context.
    ///
    /// Contexts built by hand rather than through
    /// [`OrderingGuard::next_context`](crate::OrderingGuard::next_context)
    /// are rejected by the entry point unless it issued their sequence and
    /// nothing newer was accepted yet.
    #[must_use]
    pub fn new(
        kind: PropagationKind,
        entry_point: EntryPointId,
        sequence: u64,
        handle: FactHandle,
    ) -> Self {
        Self {
            kind,
            entry_point,
            sequence,
            handle,
        }
    }

    /// Returns the event kind.
    #[must_use]
    pub fn kind(&self) -> PropagationKind {
        self.kind
    }

    /// Returns the originating entry point.
    #[must_use]
    pub fn entry_point(&self) -> &EntryPointId {
        &self.entry_point
    }

    /// Returns the logical timestamp within the entry point.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the triggering handle.
    #[must_use]
    pub fn handle(&self) -> FactHandle {
        self.handle
    }
}
