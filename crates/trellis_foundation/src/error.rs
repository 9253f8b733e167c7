//! Error types for the Trellis rule base.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.

use std::fmt;

use thiserror::Error;

use crate::handle::{EntryPointId, FactHandle, NodeId, RuleBasePartitionId, SessionId};

/// The main error type for Trellis operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error, keeping fields already set.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(match self.context.take() {
            Some(existing) => existing.merge(context),
            None => context,
        });
        self
    }

    /// Returns the taxonomy category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns true if this error was raised while asserting a fact.
    #[must_use]
    pub fn is_assertion_failure(&self) -> bool {
        self.operation() == Some(Operation::Assert)
    }

    /// Returns true if this error was raised while retracting a fact.
    #[must_use]
    pub fn is_retraction_failure(&self) -> bool {
        self.operation() == Some(Operation::Retract)
    }

    fn operation(&self) -> Option<Operation> {
        self.context.as_ref().and_then(|c| c.operation)
    }

    /// Creates an unknown handle error.
    #[must_use]
    pub fn unknown_handle(handle: FactHandle) -> Self {
        Self::new(ErrorKind::UnknownHandle(handle))
    }

    /// Creates a foreign handle error.
    #[must_use]
    pub fn foreign_handle(handle: FactHandle, factory: u32) -> Self {
        Self::new(ErrorKind::ForeignHandle { handle, factory })
    }

    /// Creates a retracted handle error.
    #[must_use]
    pub fn retracted_handle(handle: FactHandle) -> Self {
        Self::new(ErrorKind::RetractedHandle(handle))
    }

    /// Creates a duplicate assertion error.
    #[must_use]
    pub fn duplicate_assertion(handle: FactHandle) -> Self {
        Self::new(ErrorKind::DuplicateAssertion(handle))
    }

    /// Creates an invalid checkpoint error.
    #[must_use]
    pub fn invalid_checkpoint(id: i64, counter: i64) -> Self {
        Self::new(ErrorKind::InvalidCheckpoint { id, counter })
    }

    /// Creates an unreadable checkpoint error.
    #[must_use]
    pub fn unreadable_checkpoint(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnreadableCheckpoint(message.into()))
    }

    /// Creates an undeclared type error.
    #[must_use]
    pub fn undeclared_type(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UndeclaredType(name.into()))
    }

    /// Creates an unknown entry point error.
    #[must_use]
    pub fn unknown_entry_point(entry_point: &EntryPointId) -> Self {
        Self::new(ErrorKind::UnknownEntryPoint(entry_point.name().to_string()))
    }

    /// Creates a lock order violation error.
    #[must_use]
    pub fn lock_order_violation(held: RuleBasePartitionId, requested: RuleBasePartitionId) -> Self {
        Self::new(ErrorKind::LockOrderViolation { held, requested })
    }

    /// Creates a session disposed error.
    #[must_use]
    pub fn session_disposed(session: SessionId) -> Self {
        Self::new(ErrorKind::SessionDisposed(session))
    }

    /// Creates an invalid propagation context error.
    #[must_use]
    pub fn invalid_context(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidContext(message.into()))
    }

    /// Creates a rule base disposed error.
    #[must_use]
    pub fn rule_base_disposed() -> Self {
        Self::new(ErrorKind::RuleBaseDisposed)
    }

    /// Creates a node failure error.
    #[must_use]
    pub fn node_failure(node: NodeId, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NodeFailure {
            node,
            message: message.into(),
        })
    }
}

/// Taxonomy of rule base errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Unknown, foreign or already retracted handles.
    Identity,
    /// Corrupt or inconsistent persisted counters.
    Recovery,
    /// Package or network topology problems.
    Structural,
    /// Lock ordering or queueing problems.
    Concurrency,
    /// Operations on disposed entities.
    Lifecycle,
    /// Failures raised by network nodes or queued actions.
    Propagation,
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Handle was never asserted into this working memory.
    #[error("unknown fact handle: {0:?}")]
    UnknownHandle(FactHandle),

    /// Handle was issued by another working memory's factory.
    #[error("fact handle {handle:?} was not issued by factory {factory}")]
    ForeignHandle {
        /// The offending handle.
        handle: FactHandle,
        /// Id of the factory the caller owns.
        factory: u32,
    },

    /// Handle was retracted earlier and can never be used again.
    #[error("fact handle already retracted: {0:?}")]
    RetractedHandle(FactHandle),

    /// Handle is already live in the working memory.
    #[error("fact handle already asserted: {0:?}")]
    DuplicateAssertion(FactHandle),

    /// Persisted `(id, counter)` pair is inconsistent.
    #[error("invalid fact handle checkpoint: id {id}, counter {counter}")]
    InvalidCheckpoint {
        /// Persisted factory id.
        id: i64,
        /// Persisted counter.
        counter: i64,
    },

    /// Persisted checkpoint could not be read or decoded.
    #[error("unreadable fact handle checkpoint: {0}")]
    UnreadableCheckpoint(String),

    /// Checkpoint could not be encoded or written.
    #[error("failed to write fact handle checkpoint: {0}")]
    CheckpointWrite(String),

    /// Type has no declaration and strict declarations are required.
    #[error("undeclared fact type: {0}")]
    UndeclaredType(String),

    /// Two different declarations for the same type.
    #[error("conflicting type declaration for {0}")]
    ConflictingTypeDeclaration(String),

    /// Entry point is not part of the caller's view of the network.
    #[error("unknown entry point: {0}")]
    UnknownEntryPoint(String),

    /// Package name is not in the package store.
    #[error("unknown package: {0}")]
    UnknownPackage(String),

    /// Global is not declared by any package.
    #[error("unknown global: {0}")]
    UnknownGlobal(String),

    /// Global declared with different types, or set with the wrong type.
    #[error("conflicting global: {0}")]
    ConflictingGlobal(String),

    /// Partition topology of a structural change is inconsistent.
    #[error("partition conflict: {0}")]
    PartitionConflict(String),

    /// Partition lock requested out of ascending order.
    #[error("lock order violation: holding {held}, requested {requested}")]
    LockOrderViolation {
        /// Highest partition already held by the thread.
        held: RuleBasePartitionId,
        /// Partition requested.
        requested: RuleBasePartitionId,
    },

    /// Propagation context arrived out of sequence.
    #[error("out of order propagation on {entry_point}: sequence {sequence} after {last}")]
    OutOfOrderPropagation {
        /// Entry point name.
        entry_point: String,
        /// Last sequence propagated on that entry point.
        last: u64,
        /// Sequence of the rejected context.
        sequence: u64,
    },

    /// Propagation context does not match the operation or entry point, or
    /// carries a sequence that was never issued.
    #[error("invalid propagation context: {0}")]
    InvalidContext(String),

    /// Operation requires that the caller holds no rule base lock.
    #[error("operation not allowed while holding {0}")]
    LockHeld(String),

    /// Action queue is at capacity.
    #[error("action queue full ({0} actions)")]
    QueueFull(usize),

    /// Rule base was disposed.
    #[error("rule base is disposed")]
    RuleBaseDisposed,

    /// Rule base is being disposed.
    #[error("rule base is stopping")]
    RuleBaseStopping,

    /// Working memory was disposed.
    #[error("working memory disposed: {0}")]
    SessionDisposed(SessionId),

    /// A network node rejected a propagation.
    #[error("node {node} failed: {message}")]
    NodeFailure {
        /// The failing node.
        node: NodeId,
        /// Failure description.
        message: String,
    },

    /// A queued action or rule consequence failed.
    #[error("action failed: {0}")]
    ActionFailed(String),
}

impl ErrorKind {
    /// Returns the taxonomy category of this kind.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownHandle(_)
            | Self::ForeignHandle { .. }
            | Self::RetractedHandle(_)
            | Self::DuplicateAssertion(_) => ErrorCategory::Identity,
            Self::InvalidCheckpoint { .. }
            | Self::UnreadableCheckpoint(_)
            | Self::CheckpointWrite(_) => ErrorCategory::Recovery,
            Self::UndeclaredType(_)
            | Self::ConflictingTypeDeclaration(_)
            | Self::UnknownEntryPoint(_)
            | Self::UnknownPackage(_)
            | Self::UnknownGlobal(_)
            | Self::ConflictingGlobal(_)
            | Self::PartitionConflict(_) => ErrorCategory::Structural,
            Self::LockOrderViolation { .. }
            | Self::OutOfOrderPropagation { .. }
            | Self::InvalidContext(_)
            | Self::LockHeld(_)
            | Self::QueueFull(_) => ErrorCategory::Concurrency,
            Self::RuleBaseDisposed | Self::RuleBaseStopping | Self::SessionDisposed(_) => {
                ErrorCategory::Lifecycle
            }
            Self::NodeFailure { .. } | Self::ActionFailed(_) => ErrorCategory::Propagation,
        }
    }
}

/// Lifecycle operation during which an error occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Fact assertion.
    Assert,
    /// Fact retraction.
    Retract,
    /// Fact modification.
    Modify,
    /// Package addition, replacement or removal.
    PackageUpdate,
    /// Draining queued actions.
    QueuedAction,
    /// Restoring a fact handle factory.
    Recovery,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Assert => "assert",
            Self::Retract => "retract",
            Self::Modify => "modify",
            Self::PackageUpdate => "package update",
            Self::QueuedAction => "queued action",
            Self::Recovery => "recovery",
        };
        f.write_str(name)
    }
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Operation in progress.
    pub operation: Option<Operation>,
    /// Entry point the operation targeted.
    pub entry_point: Option<EntryPointId>,
    /// Handle the operation targeted.
    pub handle: Option<FactHandle>,
    /// Package the operation targeted.
    pub package: Option<String>,
}

impl ErrorContext {
    /// Creates a context for the given operation.
    #[must_use]
    pub fn new(operation: Operation) -> Self {
        Self {
            operation: Some(operation),
            ..Self::default()
        }
    }

    /// Sets the entry point.
    #[must_use]
    pub fn with_entry_point(mut self, entry_point: EntryPointId) -> Self {
        self.entry_point = Some(entry_point);
        self
    }

    /// Sets the handle.
    #[must_use]
    pub fn with_handle(mut self, handle: FactHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Sets the package name.
    #[must_use]
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    fn merge(self, other: ErrorContext) -> Self {
        Self {
            operation: self.operation.or(other.operation),
            entry_point: self.entry_point.or(other.entry_point),
            handle: self.handle.or(other.handle),
            package: self.package.or(other.package),
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(op) = self.operation {
            write!(f, "during {op}")?;
        }
        if let Some(handle) = &self.handle {
            write!(f, " of {handle}")?;
        }
        if let Some(ep) = &self.entry_point {
            write!(f, " on {ep}")?;
        }
        if let Some(package) = &self.package {
            write!(f, " in package {package}")?;
        }
        Ok(())
    }
}
