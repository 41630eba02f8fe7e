//! Shared utilities for ttpipe integration tests.
//!
//! - `TestHarness`: temp directory, hub, in-memory database and pipeline
//!   wiring
//! - `fakes`: scripted collaborators and a recording sink

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::TestHarness;
