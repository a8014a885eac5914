//! Test utilities for the Mynta workspace.
//!
//! This crate provides the mock collaborators, fixtures and builders used
//! across the workspace for testing. It is consumed through
//! `[dev-dependencies]` only and never links into production binaries.

pub mod builders;
pub mod fixtures;
pub mod helpers;

pub use builders::*;
pub use fixtures::*;
pub use helpers::*;
