//! Entry points: named fact streams.
//!
//! An [`EntryPointNode`] keeps the same identity for the lifetime of the
//! rule base, even while it is absent from the live network. It sequences
//! propagation: contexts are issued under an ordering guard that stays held
//! through propagation, so events on one entry point reach the network in
//! the order they were issued.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use im::{OrdMap, Vector};
use parking_lot::{Mutex, MutexGuard};
use trellis_foundation::{
    EntryPointId, Error, ErrorKind, FactHandle, FactType, Result, RuleBasePartitionId,
};

use crate::context::{PropagationContext, PropagationKind};
use crate::node::ObjectSink;

/// A named fact stream.
pub struct EntryPointNode {
    id: EntryPointId,
    /// Held while a context is issued and propagated.
    ordering: Mutex<()>,
    /// Last sequence issued.
    issued: AtomicU64,
    /// Last sequence accepted for propagation.
    propagated: AtomicU64,
}

impl EntryPointNode {
    /// Creates an entry point node.
    #[must_use]
    pub fn new(id: EntryPointId) -> Self {
        Self {
            id,
            ordering: Mutex::new(()),
            issued: AtomicU64::new(0),
            propagated: AtomicU64::new(0),
        }
    }

    /// Returns the entry point id.
    #[must_use]
    pub fn id(&self) -> &EntryPointId {
        &self.id
    }

    /// Acquires the ordering guard. Contexts issued through it carry
    /// increasing sequences; hold it until the propagation completes.
    pub fn order(&self) -> OrderingGuard<'_> {
        OrderingGuard {
            node: self,
            _ordering: self.ordering.lock(),
        }
    }

    /// Returns the last sequence issued.
    #[must_use]
    pub fn last_issued(&self) -> u64 {
        self.issued.load(Ordering::Acquire)
    }

    /// Returns the last sequence accepted for propagation.
    #[must_use]
    pub fn last_propagated(&self) -> u64 {
        self.propagated.load(Ordering::Acquire)
    }

    /// Accepts a context for propagation.
    ///
    /// # Errors
    /// Returns [`ErrorKind::InvalidContext`] if the context names another
    /// entry point or carries a sequence this node never issued, and
    /// [`ErrorKind::OutOfOrderPropagation`] if it is not newer than the last
    /// accepted one.
    pub fn accept(&self, context: &PropagationContext) -> Result<()> {
        if context.entry_point() != &self.id {
            return Err(Error::invalid_context(format!(
                "context of {} offered to {}",
                context.entry_point(),
                self.id
            )));
        }
        let sequence = context.sequence();
        let issued = self.last_issued();
        if sequence > issued {
            return Err(Error::invalid_context(format!(
                "sequence {sequence} was never issued on {} (last issued {issued})",
                self.id
            )));
        }
        self.propagated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                (sequence > last).then_some(sequence)
            })
            .map(|_| ())
            .map_err(|last| {
                Error::new(ErrorKind::OutOfOrderPropagation {
                    entry_point: self.id.name().to_string(),
                    last,
                    sequence,
                })
            })
    }
}

impl fmt::Debug for EntryPointNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPointNode")
            .field("id", &self.id)
            .field("last_issued", &self.last_issued())
            .field("last_propagated", &self.last_propagated())
            .finish_non_exhaustive()
    }
}

impl PartialEq for EntryPointNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EntryPointNode {}

/// Serializes context issuance on one entry point.
pub struct OrderingGuard<'a> {
    node: &'a EntryPointNode,
    _ordering: MutexGuard<'a, ()>,
}

impl OrderingGuard<'_> {
    /// Issues the next context on this entry point.
    pub fn next_context(&mut self, kind: PropagationKind, handle: FactHandle) -> PropagationContext {
        let sequence = self.node.issued.fetch_add(1, Ordering::AcqRel) + 1;
        PropagationContext::new(kind, self.node.id.clone(), sequence, handle)
    }

    /// Returns the entry point being sequenced.
    #[must_use]
    pub fn entry_point(&self) -> &EntryPointNode {
        self.node
    }
}

// =============================================================================
// Routing
// =============================================================================

/// Sinks of one object-type subgraph, all in one partition.
#[derive(Clone)]
pub struct ObjectTypeRoute {
    partition: RuleBasePartitionId,
    sinks: Vector<Arc<dyn ObjectSink>>,
}

impl ObjectTypeRoute {
    /// Creates an empty route in the given partition.
    #[must_use]
    pub fn new(partition: RuleBasePartitionId) -> Self {
        Self {
            partition,
            sinks: Vector::new(),
        }
    }

    /// Returns the route's partition.
    #[must_use]
    pub fn partition(&self) -> RuleBasePartitionId {
        self.partition
    }

    /// Returns the sinks in attachment order.
    pub fn sinks(&self) -> impl Iterator<Item = &Arc<dyn ObjectSink>> {
        self.sinks.iter()
    }

    /// Returns the number of sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns true if no sink is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

/// Routing table of one entry point.
///
/// A fact reaches the route of its own type and the any-type route.
#[derive(Clone, Default)]
pub struct EntryPointRoutes {
    by_type: OrdMap<FactType, ObjectTypeRoute>,
    any_type: Option<ObjectTypeRoute>,
}

impl EntryPointRoutes {
    /// Returns the route for a type filter (`None` = any type).
    #[must_use]
    pub fn route(&self, fact_type: Option<&FactType>) -> Option<&ObjectTypeRoute> {
        match fact_type {
            Some(ty) => self.by_type.get(ty),
            None => self.any_type.as_ref(),
        }
    }

    /// Returns the sinks a fact of `fact_type` reaches, typed route first.
    #[must_use]
    pub fn sinks_for(&self, fact_type: &FactType) -> Vec<Arc<dyn ObjectSink>> {
        self.by_type
            .get(fact_type)
            .into_iter()
            .chain(self.any_type.iter())
            .flat_map(|route| route.sinks.iter().cloned())
            .collect()
    }

    /// Returns every route, typed routes first.
    pub fn routes(&self) -> impl Iterator<Item = &ObjectTypeRoute> {
        self.by_type.values().chain(self.any_type.iter())
    }

    /// Attaches a sink, creating the route in `partition` if needed.
    ///
    /// # Errors
    /// Returns [`ErrorKind::PartitionConflict`] if the route already lives
    /// in a different partition than the sink.
    pub fn attach(&mut self, fact_type: Option<FactType>, sink: Arc<dyn ObjectSink>) -> Result<()> {
        let partition = sink.partition();
        let route = match fact_type {
            Some(ty) => {
                if !self.by_type.contains_key(&ty) {
                    self.by_type.insert(ty, ObjectTypeRoute::new(partition));
                }
                self.by_type.get_mut(&ty).ok_or_else(|| {
                    Error::new(ErrorKind::PartitionConflict(format!("route for {ty} vanished")))
                })?
            }
            None => self
                .any_type
                .get_or_insert_with(|| ObjectTypeRoute::new(partition)),
        };
        if route.partition != partition {
            return Err(Error::new(ErrorKind::PartitionConflict(format!(
                "node {} is in {partition} but its subgraph is in {}",
                sink.id(),
                route.partition
            ))));
        }
        route.sinks.push_back(sink);
        Ok(())
    }

    /// Detaches the sink with the given node id.
    ///
    /// Returns the partition of a route that became empty and was removed.
    pub fn detach(
        &mut self,
        fact_type: Option<&FactType>,
        node: trellis_foundation::NodeId,
    ) -> Option<RuleBasePartitionId> {
        let route = match fact_type {
            Some(ty) => self.by_type.get_mut(ty)?,
            None => self.any_type.as_mut()?,
        };
        route.sinks.retain(|sink| sink.id() != node);
        if !route.is_empty() {
            return None;
        }
        let partition = route.partition;
        match fact_type {
            Some(ty) => {
                self.by_type.remove(ty);
            }
            None => self.any_type = None,
        }
        Some(partition)
    }

    /// Returns true if no route has sinks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty() && self.any_type.is_none()
    }
}
