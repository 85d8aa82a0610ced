//! Test Utilities Crate
//!
//! Shared test infrastructure for the school core test suite.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built contexts and rows for common scenarios
//! - `doubles`: Capturing and failure-injecting storage/audit doubles
//! - `assertions`: Assertion helpers for tenant and soft-delete properties

pub mod assertions;
pub mod doubles;
pub mod fixtures;

pub use assertions::*;
pub use doubles::*;
pub use fixtures::*;
