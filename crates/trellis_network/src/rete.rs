//! The discrimination network root.
//!
//! A [`Rete`] is an immutable snapshot of the live network: entry points,
//! their routing tables, and every node. Structural changes clone the
//! current snapshot (cheap, the maps are persistent), edit the clone off to
//! the side, and publish it in one step.

use std::fmt;
use std::sync::Arc;

use im::OrdMap;
use trellis_foundation::{
    EntryPointId, Error, ErrorKind, FactType, NodeId, Result, RuleBasePartitionId,
};

use crate::entry_point::{EntryPointNode, EntryPointRoutes};
use crate::node::{ObjectSink, RuleName};

/// A node together with where it is attached.
#[derive(Clone)]
pub struct NetworkNode {
    /// The node itself.
    pub sink: Arc<dyn ObjectSink>,
    /// Entry point the node listens on.
    pub entry_point: EntryPointId,
    /// Fact type filter of the node's subgraph.
    pub fact_type: Option<FactType>,
}

/// Snapshot of the discrimination network.
#[derive(Clone, Default)]
pub struct Rete {
    entry_points: OrdMap<EntryPointId, Arc<EntryPointNode>>,
    routes: OrdMap<EntryPointId, EntryPointRoutes>,
    nodes: OrdMap<NodeId, NetworkNode>,
    rules: OrdMap<RuleName, NodeId>,
}

impl Rete {
    /// Creates an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry point node registered under `id`.
    #[must_use]
    pub fn entry_point(&self, id: &EntryPointId) -> Option<&Arc<EntryPointNode>> {
        self.entry_points.get(id)
    }

    /// Returns all live entry points, ordered by name.
    pub fn entry_points(&self) -> impl Iterator<Item = &Arc<EntryPointNode>> {
        self.entry_points.values()
    }

    /// Returns the ids of all live entry points.
    #[must_use]
    pub fn entry_point_ids(&self) -> Vec<EntryPointId> {
        self.entry_points.keys().cloned().collect()
    }

    /// Returns the sinks reached by a fact of `fact_type` on `entry_point`.
    #[must_use]
    pub fn sinks_for(&self, entry_point: &EntryPointId, fact_type: &FactType) -> Vec<Arc<dyn ObjectSink>> {
        self.routes
            .get(entry_point)
            .map(|routes| routes.sinks_for(fact_type))
            .unwrap_or_default()
    }

    /// Returns the routing table of an entry point.
    #[must_use]
    pub fn routes(&self, entry_point: &EntryPointId) -> Option<&EntryPointRoutes> {
        self.routes.get(entry_point)
    }

    /// Returns the partition of an existing subgraph.
    #[must_use]
    pub fn route_partition(
        &self,
        entry_point: &EntryPointId,
        fact_type: Option<&FactType>,
    ) -> Option<RuleBasePartitionId> {
        self.routes
            .get(entry_point)
            .and_then(|routes| routes.route(fact_type))
            .map(crate::entry_point::ObjectTypeRoute::partition)
    }

    /// Returns a node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&NetworkNode> {
        self.nodes.get(&id)
    }

    /// Returns true if the node is part of this snapshot.
    #[must_use]
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Returns all nodes ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &NetworkNode> {
        self.nodes.values()
    }

    /// Returns the node evaluating a rule.
    #[must_use]
    pub fn node_for_rule(&self, rule: &RuleName) -> Option<NodeId> {
        self.rules.get(rule).copied()
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the distinct partitions of `sinks` in ascending order.
    #[must_use]
    pub fn partitions_of(sinks: &[Arc<dyn ObjectSink>]) -> Vec<RuleBasePartitionId> {
        let mut ids: Vec<_> = sinks.iter().map(|s| s.partition()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    // -------------------------------------------------------------------------
    // Editing (on a private clone before publication)
    // -------------------------------------------------------------------------

    /// Adds an entry point. Re-adding the same id keeps the existing node.
    pub fn add_entry_point(&mut self, node: Arc<EntryPointNode>) {
        let id = node.id().clone();
        if !self.entry_points.contains_key(&id) {
            self.routes.insert(id.clone(), EntryPointRoutes::default());
            self.entry_points.insert(id, node);
        }
    }

    /// Removes an entry point and its routing table.
    pub fn remove_entry_point(&mut self, id: &EntryPointId) -> Option<Arc<EntryPointNode>> {
        self.routes.remove(id);
        self.entry_points.remove(id)
    }

    /// Attaches a node to an entry point's routing table.
    ///
    /// # Errors
    /// Fails if the entry point is not in the network, the node id or rule
    /// is already present, or the node's partition conflicts with its
    /// subgraph.
    pub fn add_node(&mut self, node: NetworkNode) -> Result<()> {
        let id = node.sink.id();
        let rule = node.sink.rule().clone();
        if self.nodes.contains_key(&id) || self.rules.contains_key(&rule) {
            return Err(Error::new(ErrorKind::PartitionConflict(format!(
                "{id} for rule {rule} is already in the network"
            ))));
        }
        let routes = self
            .routes
            .get_mut(&node.entry_point)
            .ok_or_else(|| Error::unknown_entry_point(&node.entry_point))?;
        routes.attach(node.fact_type, Arc::clone(&node.sink))?;
        self.rules.insert(rule, id);
        self.nodes.insert(id, node);
        Ok(())
    }

    /// Detaches a node.
    ///
    /// Returns the removed node and, if its subgraph became empty, the
    /// partition that subgraph occupied.
    pub fn remove_node(&mut self, id: NodeId) -> Option<(NetworkNode, Option<RuleBasePartitionId>)> {
        let node = self.nodes.remove(&id)?;
        self.rules.remove(node.sink.rule());
        let emptied = self
            .routes
            .get_mut(&node.entry_point)
            .and_then(|routes| routes.detach(node.fact_type.as_ref(), id));
        Some((node, emptied))
    }

    /// Returns entry points (other than the default stream) with no nodes.
    #[must_use]
    pub fn unused_entry_points(&self) -> Vec<EntryPointId> {
        self.routes
            .iter()
            .filter(|(id, routes)| !id.is_default() && routes.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl fmt::Debug for Rete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rete")
            .field("entry_points", &self.entry_point_ids())
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
