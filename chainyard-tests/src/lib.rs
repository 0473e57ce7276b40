//! Test utilities for the chainyard workspace
//!
//! Provides an in-memory container runtime and a throwaway host layout so
//! orchestrator behaviour can be exercised without a container engine.

pub mod helpers;

pub use helpers::fake_runtime::{FakeOp, FakeRuntime, RuntimeCall};
pub use helpers::yard::TestYard;
