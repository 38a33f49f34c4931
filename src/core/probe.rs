//! State probing
//!
//! Issues the single read-only command that tells the reconciler where the
//! system currently stands:
//!
//! - Rule mode: `-C` with the rule body. Exit 0 means present, any other exit
//!   means absent. iptables reports "no such rule" and "bad rule" alike with a
//!   non-zero exit, so a malformed rule probes as absent and the later mutation
//!   surfaces the real error.
//! - Policy mode: `-L <chain>`, then the `(policy X)` header is parsed.
//! - Flush mode: nothing to probe.

use crate::core::error::{Error, Result};
use crate::core::rule::{Family, Mode, RuleSpec};
use crate::core::synth::{Operation, synthesize};
use crate::exec::CommandRunner;
use tracing::{debug, warn};

/// What the probe found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Presence { present: bool },
    Policy { current: String },
    Skipped,
}

/// A probe result together with the command that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub result: ProbeResult,
    pub command: Option<Vec<String>>,
}

/// Runs the probe for one family.
///
/// # Errors
///
/// - [`Error::Execution`] if the tool cannot be run
/// - [`Error::Probe`] if the chain listing fails or has no policy header for the chain
pub fn probe(
    runner: &mut impl CommandRunner,
    spec: &RuleSpec,
    family: Family,
    binary: &str,
) -> Result<Probe> {
    match spec.mode() {
        Mode::Flush => Ok(Probe {
            result: ProbeResult::Skipped,
            command: None,
        }),
        Mode::Rule { .. } => {
            let command = synthesize(spec, family, binary, Operation::Check)?;
            let output = runner.run(&command)?;
            let present = output.success();
            if !present && !output.stderr.trim().is_empty() {
                debug!("Check exited {}: {}", output.exit_code, output.stderr.trim());
            }
            Ok(Probe {
                result: ProbeResult::Presence { present },
                command: Some(command),
            })
        }
        Mode::Policy(_) => {
            let command = synthesize(spec, family, binary, Operation::List)?;
            let output = runner.run(&command)?;
            let chain = spec.chain().unwrap_or_default();

            if !output.success() {
                warn!("Listing chain {chain} failed: {}", output.stderr.trim());
                return Err(Error::probe(format!(
                    "listing chain {chain} exited with status {}: {}",
                    output.exit_code,
                    output.stderr.trim()
                )));
            }

            let current = parse_policy(&output.stdout, chain).ok_or_else(|| {
                Error::probe(format!(
                    "no policy found for chain {chain} (user-defined chains have no policy)"
                ))
            })?;

            Ok(Probe {
                result: ProbeResult::Policy { current },
                command: Some(command),
            })
        }
    }
}

/// Extracts the policy target from a chain listing.
///
/// Looks for a header line of the form `Chain <chain> (policy <TARGET> ...)`.
/// Whitespace is tolerated, text after the target (packet and byte counters) is
/// ignored, and headers for other chains are skipped.
///
/// # Examples
///
/// ```
/// use iptables_reconcile::core::probe::parse_policy;
///
/// let listing = "Chain INPUT (policy DROP 0 packets, 0 bytes)\ntarget prot opt source destination\n";
/// assert_eq!(parse_policy(listing, "INPUT").as_deref(), Some("DROP"));
/// assert_eq!(parse_policy(listing, "OUTPUT"), None);
/// ```
pub fn parse_policy(listing: &str, chain: &str) -> Option<String> {
    listing.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("Chain")?;
        let mut words = rest.split_whitespace();
        if words.next()? != chain {
            return None;
        }
        let after_name = rest.trim_start().strip_prefix(chain)?;
        let inner = after_name.trim_start().strip_prefix('(')?;
        let mut words = inner
            .split(|c: char| c.is_whitespace() || c == ')')
            .filter(|word| !word.is_empty());
        if words.next()? != "policy" {
            return None;
        }
        words.next().map(str::to_string)
    })
}
