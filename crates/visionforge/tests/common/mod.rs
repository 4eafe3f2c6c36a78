//! Shared test utilities for visionforge integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated pipeline runs with temp directories
//! - Builder patterns for configs and scripted text responses
//! - Fake collaborators with call recording and failure injection

pub mod builders;
pub mod fakes;
pub mod harness;

pub use builders::*;
pub use fakes::*;
pub use harness::TestHarness;
