//! Fact handles and the other identifiers shared across the rule base.

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identity of one asserted fact within one working memory.
///
/// A handle is issued by exactly one fact handle factory (`factory`) and
/// carries the value that factory issued (`id`). Factories never reissue a
/// value, so a retracted handle stays dead for the lifetime of its session.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FactHandle {
    /// Id of the factory that issued this handle.
    pub factory: u32,
    /// Value issued by the factory (starts at 1).
    pub id: u64,
}

impl FactHandle {
    /// Creates a handle from its raw parts.
    #[must_use]
    pub const fn new(factory: u32, id: u64) -> Self {
        Self { factory, id }
    }
}

impl fmt::Debug for FactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FactHandle({}:{})", self.factory, self.id)
    }
}

impl fmt::Display for FactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.factory, self.id)
    }
}

/// Identifier of a disjoint, independently lockable region of the network.
///
/// Partition ids are allocated monotonically and never reused while the
/// rule base is alive.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RuleBasePartitionId(pub u32);

impl RuleBasePartitionId {
    /// The first partition every rule base allocates.
    pub const MAIN: RuleBasePartitionId = RuleBasePartitionId(0);

    /// Returns the raw partition number.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for RuleBasePartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Partition({})", self.0)
    }
}

impl fmt::Display for RuleBasePartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Working memory identifier, taken from the rule base's session counter.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Network node identifier.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Name of a fact stream.
///
/// Cloning is O(1); the name is shared.
#[derive(Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct EntryPointId(Arc<str>);

impl EntryPointId {
    /// Name of the stream facts go to when no entry point is named.
    pub const DEFAULT_NAME: &'static str = "DEFAULT";

    /// Creates an entry point id from a name.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The default entry point.
    #[must_use]
    pub fn default_stream() -> Self {
        Self::new(Self::DEFAULT_NAME)
    }

    /// Returns the entry point name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Returns true for the default stream.
    #[must_use]
    pub fn is_default(&self) -> bool {
        &*self.0 == Self::DEFAULT_NAME
    }
}

impl Default for EntryPointId {
    fn default() -> Self {
        Self::default_stream()
    }
}

impl From<&str> for EntryPointId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Debug for EntryPointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryPoint({})", self.0)
    }
}

impl fmt::Display for EntryPointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
