//! Integration tests for Layer 2: Engine
//!
//! Tests for packages, working memories, and persistence.

mod packages;
mod persistence;
mod sessions;
