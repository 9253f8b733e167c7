//! Rule base coordinator, packages, and working memory sessions for Trellis.
//!
//! This crate provides:
//! - [`RuleBase`] - Shared coordinator: packages, types, network, locking
//! - [`WorkingMemory`] - Session holding facts, node memories and an agenda
//! - [`FactHandleFactory`] - Per-session fact identity allocation
//! - [`PackageStore`] / [`TypeRegistry`] - Copy-on-replace registries
//! - [`persistence`] - `MessagePack` checkpoints of handle factories

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod agenda;
pub mod clock;
pub mod config;
pub mod factory;
pub mod package;
pub mod persistence;
pub mod rule_base;
pub mod session;
pub mod type_registry;

pub use agenda::Agenda;
pub use clock::SessionClock;
pub use config::{ClockType, EventProcessingMode, RuleBaseConfiguration};
pub use factory::FactHandleFactory;
pub use package::{Consequence, Package, PackageSnapshot, PackageStore, Rule};
pub use persistence::{
    CheckpointStore, FactHandleCheckpoint, FileCheckpointStore, MemoryCheckpointStore,
};
pub use rule_base::{QueuedActionReport, RuleBase, RuleBaseReadGuard, RuleBaseState};
pub use session::{RuleContext, WorkingMemory};
pub use type_registry::{TypeRegistry, TypeTable};
