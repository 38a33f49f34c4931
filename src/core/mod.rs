//! Core reconciliation functionality
//!
//! This module contains the types and logic for bringing one iptables rule or
//! chain policy into a desired state. It provides:
//!
//! - [`rule`]: Raw parameters and the validated rule specification
//! - [`rule_constraints`]: Business rules for valid option combinations
//! - [`synth`]: Argument vectors for each iptables operation
//! - [`probe`]: Read-only queries of the current state
//! - [`reconcile`]: The probe/decide/mutate state machine
//! - [`error`]: Error types for reconciliation

pub mod error;
pub mod probe;
pub mod reconcile;
pub mod rule;
pub mod rule_constraints;
pub mod synth;

#[cfg(test)]
pub mod test_helpers;

#[cfg(test)]
mod tests;
