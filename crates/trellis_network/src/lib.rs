//! Discrimination network root, entry points, and partitioning for Trellis.
//!
//! This crate provides:
//! - [`PropagationContext`] - Immutable record of one lifecycle event
//! - [`PartitionManager`] - Partition ids and ordered partition locking
//! - [`EntryPointNode`] - Named fact streams with ordered propagation
//! - [`Rete`] - Immutable snapshot of the live network
//! - [`ObjectSink`] / [`NodeProvider`] - Contract for concrete network nodes

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod context;
pub mod entry_point;
pub mod node;
pub mod partition;
pub mod rete;

pub use context::{PropagationContext, PropagationKind};
pub use entry_point::{EntryPointNode, EntryPointRoutes, ObjectTypeRoute, OrderingGuard};
pub use node::{
    Activation, Always, Condition, NodeProvider, NodeSpec, ObjectSink, RuleName, RuleTerminalNode,
    TerminalNodeProvider,
};
pub use partition::{Partition, PartitionGuard, PartitionManager};
pub use rete::{NetworkNode, Rete};
