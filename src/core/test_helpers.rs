//! Shared test utilities for core module tests
//!
//! Provides a scripted command runner and a fixed binary resolver so the
//! reconciler can be exercised without touching real iptables.
//! This module is only compiled in test mode.

use crate::core::error::{Error, Result};
use crate::core::rule::Family;
use crate::exec::{BinaryResolver, CommandOutput, CommandRunner};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Mutex for tests that need exclusive access to environment variables.
///
/// # Example
///
/// ```ignore
/// let _guard = ENV_VAR_MUTEX.lock().unwrap();
/// unsafe {
///     std::env::set_var("IPTR_IPTABLES_COMMAND", "/tmp/iptables");
/// }
/// // ... test with custom env state ...
/// unsafe {
///     std::env::remove_var("IPTR_IPTABLES_COMMAND");
/// }
/// ```
pub static ENV_VAR_MUTEX: Mutex<()> = Mutex::new(());

/// Command runner that replays scripted results and records every call.
///
/// Running out of scripted results is an execution error, so a test that
/// expects N commands fails loudly if the reconciler issues an (N+1)th.
#[derive(Debug, Default)]
pub struct MockRunner {
    results: VecDeque<CommandOutput>,
    pub calls: Vec<Vec<String>>,
}

impl MockRunner {
    /// Scripted `(exit_code, stdout, stderr)` results, in call order.
    pub fn new(results: &[(i32, &str, &str)]) -> Self {
        Self {
            results: results
                .iter()
                .map(|(code, out, err)| CommandOutput::new(*code, *out, *err))
                .collect(),
            calls: Vec::new(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }
}

impl CommandRunner for MockRunner {
    fn run(&mut self, command: &[String]) -> Result<CommandOutput> {
        self.calls.push(command.to_vec());
        self.results.pop_front().ok_or_else(|| Error::Execution {
            program: command.first().cloned().unwrap_or_default(),
            message: format!("unexpected command: {}", command.join(" ")),
        })
    }
}

/// Runner whose processes can never be started
#[derive(Debug, Default)]
pub struct FailingRunner;

impl CommandRunner for FailingRunner {
    fn run(&mut self, command: &[String]) -> Result<CommandOutput> {
        Err(Error::Execution {
            program: command.first().cloned().unwrap_or_default(),
            message: "No such file or directory (os error 2)".to_string(),
        })
    }
}

/// Resolves to `/sbin/iptables` and `/sbin/ip6tables`
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedResolver;

impl BinaryResolver for FixedResolver {
    fn resolve(&self, family: Family) -> Result<String> {
        Ok(format!("/sbin/{}", family.binary_name()))
    }
}

/// Converts string literals into an owned argument vector.
pub fn args(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|t| (*t).to_string()).collect()
}
