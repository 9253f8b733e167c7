//! Integration tests for Layer 0: Foundation
//!
//! Tests for core types: handles, facts, type declarations, and errors.

mod errors;
mod handles;
