//! Core rule management functionality
//!
//! - [`rule`]: Rule data structures and the traffic-check request
//! - [`store`]: The persisted rule document
//! - [`runner`]: Process execution seam (real and recording runners)
//! - [`gateway`]: Dependency checks and backend invocation
//! - [`manager`]: Public operations composing the above with the audit log
//! - [`error`]: Error types for rule operations

pub mod error;
pub mod gateway;
pub mod manager;
pub mod rule;
pub mod runner;
pub mod store;

#[cfg(test)]
pub mod test_helpers;
