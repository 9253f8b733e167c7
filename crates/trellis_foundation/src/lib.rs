//! Fact handles, fact types, type declarations, and errors for Trellis.
//!
//! This crate provides:
//! - [`FactHandle`] - Stable identity of one asserted fact
//! - [`Fact`] and [`FactType`] - Shared fact objects with explicit type tags
//! - [`TypeDeclaration`] - Per-type metadata (fact vs. event)
//! - [`RuleBasePartitionId`], [`SessionId`], [`NodeId`], [`EntryPointId`]
//! - [`Error`] - Categorized error types with context

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod fact;
pub mod handle;
pub mod types;

pub use error::{Error, ErrorCategory, ErrorContext, ErrorKind, Operation};
pub use fact::{Fact, FactType};
pub use handle::{EntryPointId, FactHandle, NodeId, RuleBasePartitionId, SessionId};
pub use types::{Role, TypeDeclaration};

/// Result type for Trellis operations.
pub type Result<T> = std::result::Result<T, Error>;
