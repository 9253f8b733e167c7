//! Network node contract.
//!
//! Concrete node types come from a [`NodeProvider`]. The rule base only
//! relies on the identity and partitioning contract of [`ObjectSink`]:
//! every node has a stable [`NodeId`], belongs to one partition, and turns
//! assertions into activations.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use trellis_foundation::{
    EntryPointId, Fact, FactHandle, FactType, NodeId, Result, RuleBasePartitionId,
};

use crate::context::PropagationContext;

// =============================================================================
// Rule Identity
// =============================================================================

/// Fully qualified rule name: package plus rule.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleName {
    package: Arc<str>,
    rule: Arc<str>,
}

impl RuleName {
    /// Creates a rule name.
    #[must_use]
    pub fn new(package: impl AsRef<str>, rule: impl AsRef<str>) -> Self {
        Self {
            package: Arc::from(package.as_ref()),
            rule: Arc::from(rule.as_ref()),
        }
    }

    /// Returns the package name.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Returns the rule name within its package.
    #[must_use]
    pub fn rule(&self) -> &str {
        &self.rule
    }
}

impl fmt::Debug for RuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleName({}/{})", self.package, self.rule)
    }
}

impl fmt::Display for RuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.rule)
    }
}

// =============================================================================
// Conditions
// =============================================================================

/// A compiled rule condition over a single fact.
pub trait Condition: Send + Sync {
    /// Returns true if the fact satisfies the condition.
    fn matches(&self, fact: &Fact) -> bool;
}

impl<F> Condition for F
where
    F: Fn(&Fact) -> bool + Send + Sync,
{
    fn matches(&self, fact: &Fact) -> bool {
        self(fact)
    }
}

/// Condition that accepts every fact.
#[derive(Clone, Copy, Debug, Default)]
pub struct Always;

impl Condition for Always {
    fn matches(&self, _fact: &Fact) -> bool {
        true
    }
}

// =============================================================================
// Activation
// =============================================================================

/// A match produced by a node: the rule is ready to fire for a fact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Activation {
    /// Rule that matched.
    pub rule: RuleName,
    /// Node that produced the match.
    pub node: NodeId,
    /// Matched fact.
    pub handle: FactHandle,
    /// Rule priority (higher fires first).
    pub salience: i32,
    /// Sequence of the propagation that produced the match.
    pub sequence: u64,
}

// =============================================================================
// Node Contract
// =============================================================================

/// Everything a provider needs to build one node.
#[derive(Clone)]
pub struct NodeSpec {
    /// Identity assigned by the rule base.
    pub id: NodeId,
    /// Rule the node evaluates.
    pub rule: RuleName,
    /// Rule priority.
    pub salience: i32,
    /// Stream the node listens on.
    pub entry_point: EntryPointId,
    /// Fact type filter (`None` accepts every type on the stream).
    pub fact_type: Option<FactType>,
    /// Compiled condition.
    pub condition: Arc<dyn Condition>,
    /// Partition the node belongs to.
    pub partition: RuleBasePartitionId,
}

impl fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSpec")
            .field("id", &self.id)
            .field("rule", &self.rule)
            .field("entry_point", &self.entry_point)
            .field("fact_type", &self.fact_type)
            .field("partition", &self.partition)
            .finish_non_exhaustive()
    }
}

/// A network node that facts are propagated into.
///
/// Methods are only called while the node's partition lock is held.
pub trait ObjectSink: Send + Sync {
    /// Stable node identity.
    fn id(&self) -> NodeId;

    /// Rule this node belongs to.
    fn rule(&self) -> &RuleName;

    /// Partition this node belongs to.
    fn partition(&self) -> RuleBasePartitionId;

    /// Propagates an assertion. Returns an activation if the fact matched.
    ///
    /// # Errors
    /// A failure aborts the whole propagation; the caller compensates
    /// nodes that already accepted the fact.
    fn assert_object(
        &self,
        handle: FactHandle,
        fact: &Fact,
        context: &PropagationContext,
    ) -> Result<Option<Activation>>;

    /// Propagates a retraction of a fact this node matched earlier.
    ///
    /// # Errors
    /// A failure aborts the whole retraction; the caller re-asserts into
    /// nodes that already dropped the fact.
    fn retract_object(&self, handle: FactHandle, context: &PropagationContext) -> Result<()>;
}

/// Builds concrete nodes for rules.
pub trait NodeProvider: Send + Sync {
    /// Builds the node described by `spec`.
    ///
    /// # Errors
    /// Returns an error if the node cannot be built; the structural change
    /// that asked for it is abandoned.
    fn build(&self, spec: NodeSpec) -> Result<Arc<dyn ObjectSink>>;
}

// =============================================================================
// Default Terminal Node
// =============================================================================

/// Single-pattern node: tests the condition and emits an activation.
pub struct RuleTerminalNode {
    spec: NodeSpec,
    asserted: AtomicU64,
    retracted: AtomicU64,
}

impl RuleTerminalNode {
    /// Creates a node from its spec.
    #[must_use]
    pub fn new(spec: NodeSpec) -> Self {
        Self {
            spec,
            asserted: AtomicU64::new(0),
            retracted: AtomicU64::new(0),
        }
    }

    /// Number of matching assertions seen.
    #[must_use]
    pub fn asserted(&self) -> u64 {
        self.asserted.load(Ordering::Relaxed)
    }

    /// Number of retractions seen.
    #[must_use]
    pub fn retracted(&self) -> u64 {
        self.retracted.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for RuleTerminalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleTerminalNode")
            .field("spec", &self.spec)
            .field("asserted", &self.asserted())
            .field("retracted", &self.retracted())
            .finish()
    }
}

impl ObjectSink for RuleTerminalNode {
    fn id(&self) -> NodeId {
        self.spec.id
    }

    fn rule(&self) -> &RuleName {
        &self.spec.rule
    }

    fn partition(&self) -> RuleBasePartitionId {
        self.spec.partition
    }

    fn assert_object(
        &self,
        handle: FactHandle,
        fact: &Fact,
        context: &PropagationContext,
    ) -> Result<Option<Activation>> {
        if !self.spec.condition.matches(fact) {
            return Ok(None);
        }
        self.asserted.fetch_add(1, Ordering::Relaxed);
        Ok(Some(Activation {
            rule: self.spec.rule.clone(),
            node: self.spec.id,
            handle,
            salience: self.spec.salience,
            sequence: context.sequence(),
        }))
    }

    fn retract_object(&self, _handle: FactHandle, _context: &PropagationContext) -> Result<()> {
        self.retracted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Default provider: one [`RuleTerminalNode`] per rule.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalNodeProvider;

impl NodeProvider for TerminalNodeProvider {
    fn build(&self, spec: NodeSpec) -> Result<Arc<dyn ObjectSink>> {
        Ok(Arc::new(RuleTerminalNode::new(spec)))
    }
}
