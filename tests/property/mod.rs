//! Property-based tests for encoding and delivery invariants

mod encoding;
mod retry;
