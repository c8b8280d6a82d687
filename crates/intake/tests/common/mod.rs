//! Shared test utilities for intake integration tests.
//!
//! This module provides:
//! - `TestHarness` for an orchestrator over an in-memory database and a temp upload directory
//! - Fake extractors (fixed, slow, failing, hanging, gated)
//! - Builders for candidate records

pub mod builders;
pub mod extractors;
pub mod harness;

pub use builders::*;
pub use extractors::*;
pub use harness::{wait_for_job, wait_for_terminal, TestHarness};
