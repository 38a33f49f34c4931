//! iptables-reconcile
//!
//! Idempotent management of a single iptables rule, chain policy or flush.
//!
//! # Architecture
//!
//! - [`core`] - Rule specification, command synthesis, probing and reconciliation
//! - [`exec`] - Process execution and binary lookup
//! - [`report`] - JSON outcome report
//! - [`validators`] - Input validation and sanitization
//! - [`config`] - Settings file loading
//! - [`utils`] - Utility functions (XDG directories, binary search)
//!
//! # Guarantees
//!
//! - Every mutation is preceded by a read-only probe, and skipped when the
//!   system already matches
//! - At most one mutating command per address family
//! - Arguments are passed as a vector, never through a shell
//! - Simulation (`--check`) never runs a mutating command

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod core;
pub mod exec;
pub mod report;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::error::{Error, Result};
pub use core::reconcile::{Outcome, Reconciler};
pub use core::rule::{RuleParams, RuleSpec};
