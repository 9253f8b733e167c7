//! Integration tests for Layer 1: Network
//!
//! Tests for partition locking, entry point ordering, and node rollback.

mod partitions;
