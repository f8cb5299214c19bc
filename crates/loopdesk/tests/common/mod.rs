//! Shared test utilities for loopdesk integration tests.
//!
//! This module provides:
//! - `TestHarness` with an isolated database and upload directories
//! - Builders for loop and template payloads

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
