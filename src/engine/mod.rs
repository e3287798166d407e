//! Execution engine for provision
//!
//! The engine orchestrates a node run around the converge executor:
//! 1. Previewing - Dry run to find pending changes
//! 2. Displaying - Boxed plan with content diffs
//! 3. Executing - Confirm, converge with progress, record the report

pub mod differ;
pub mod executor;

pub use executor::{ApplyOptions, ApplyOutcome, RunInput, execute};
