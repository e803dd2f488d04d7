//! rulekeeper - firewall rule management front end
//!
//! Validates rule edits, keeps an audit trail of every attempt, and drives
//! an external enforcement backend (a set of executable scripts) that does
//! the actual packet filtering.
//!
//! # Architecture
//!
//! - [`core`] - Rule model, rule store, backend gateway and the rule manager
//! - [`audit`] - Append-only audit log of every operation
//! - [`validators`] - Input validation and normalization
//! - [`config`] - Configuration persistence
//! - [`utils`] - Utility functions (XDG directories, executable lookup)
//!
//! # Safety Features
//!
//! - All inputs validated before anything external is touched
//! - Dependency checks before every backend call
//! - Deletes checked against a fresh read of the rule document
//! - Atomic file operations with secure permissions

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod config;
pub mod core;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::error::{Error, Result};
pub use core::manager::{RuleInput, RuleManager, TrafficQuery};
pub use core::rule::{Action, Protocol, Rule, TrafficReport};
