//! Shared test utilities for docsign integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated workflow runs over a temp-dir folder store
//! - Builders for PDF forms, signatures and stage configurations

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
