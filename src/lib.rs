//! Trellis - Incrementally evaluated fact base for production rule systems
//!
//! This crate re-exports all layers of the Trellis system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 2: trellis_engine     - Rule base, packages, types, working memories
//! Layer 1: trellis_network    - Entry points, partitions, network snapshots
//! Layer 0: trellis_foundation - Core types (FactHandle, Fact, Error)
//! ```

pub use trellis_engine as engine;
pub use trellis_foundation as foundation;
pub use trellis_network as network;
