//! Shared test utilities for rulesync integration tests.
//!
//! This module provides:
//! - `TestHarness` for a config directory in a temp dir
//! - `RecordingRuler` / `RecordingFactory`, an in-memory ruler that records every call

pub mod harness;
pub mod ruler;

pub use harness::TestHarness;
pub use ruler::{Call, RecordingFactory, RecordingRuler};
