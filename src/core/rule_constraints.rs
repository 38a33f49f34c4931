//! Rule constraint functions for iptables rule options
//!
//! This module centralizes knowledge about which option combinations iptables
//! accepts and which match extensions an option depends on. Rule validation
//! ([`check_body`]) and the command synthesizer both call into it, so the two
//! never disagree about, say, which module `--ctstate` is loaded from.
//!
//! # Examples
//!
//! ```
//! use iptables_reconcile::core::rule_constraints::*;
//!
//! // reject_with only makes sense for the REJECT target
//! assert!(reject_with_compatible(Some("REJECT")));
//! assert!(reject_with_compatible(None));
//! assert!(!reject_with_compatible(Some("DROP")));
//!
//! // ctstate picks up whichever state module the caller already loaded
//! let loaded = vec!["state".to_string()];
//! assert_eq!(ctstate_module(&loaded), CtstateModule::State);
//! ```

use super::error::{Error, Result};
use super::rule::RuleBody;
use tracing::warn;

// ═══════════════════════════════════════════════════════════════════════════
// Target Constraints
// ═══════════════════════════════════════════════════════════════════════════

/// Returns `true` if `reject_with` may accompany the given explicit jump.
///
/// `--reject-with` is an option of the REJECT target. With no explicit jump the
/// rule implies `-j REJECT`; any other target is a contradiction.
///
/// # Examples
///
/// ```
/// use iptables_reconcile::core::rule_constraints::reject_with_compatible;
///
/// assert!(reject_with_compatible(Some("REJECT")));
/// assert!(reject_with_compatible(None));
/// assert!(!reject_with_compatible(Some("ACCEPT")));
/// ```
#[inline]
pub fn reject_with_compatible(jump: Option<&str>) -> bool {
    matches!(jump, None | Some("REJECT"))
}

/// Returns `true` if both a jump target and a goto target are requested.
///
/// `-j` and `-g` each select where a matching packet continues; a rule has at
/// most one of them.
///
/// # Examples
///
/// ```
/// use iptables_reconcile::core::rule_constraints::jump_conflicts_with_goto;
///
/// assert!(jump_conflicts_with_goto(Some("ACCEPT"), Some("LOGGING")));
/// assert!(!jump_conflicts_with_goto(None, Some("LOGGING")));
/// assert!(!jump_conflicts_with_goto(Some("ACCEPT"), None));
/// ```
#[inline]
pub fn jump_conflicts_with_goto(jump: Option<&str>, goto: Option<&str>) -> bool {
    jump.is_some() && goto.is_some()
}

/// Returns `true` if both DSCP forms are requested.
///
/// The DSCP target takes either a numeric value or a class name, not both.
#[inline]
pub fn dscp_options_conflict(mark: Option<&str>, class: Option<&str>) -> bool {
    mark.is_some() && class.is_some()
}

// ═══════════════════════════════════════════════════════════════════════════
// Match Module Dependencies
// ═══════════════════════════════════════════════════════════════════════════

/// Returns `true` if the named match extension is already in the rule's
/// explicit `match` list.
///
/// # Examples
///
/// ```
/// use iptables_reconcile::core::rule_constraints::match_module_loaded;
///
/// let matches = vec!["tcp".to_string(), "limit".to_string()];
/// assert!(match_module_loaded(&matches, "limit"));
/// assert!(!match_module_loaded(&matches, "owner"));
/// ```
#[inline]
pub fn match_module_loaded(matches: &[String], name: &str) -> bool {
    matches.iter().any(|m| m == name)
}

/// Which module supplies the connection-state match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtstateModule {
    /// `conntrack` is in the match list; emit `--ctstate`
    Conntrack,
    /// `state` is in the match list; emit `--state`
    State,
    /// Neither is loaded; emit `-m conntrack --ctstate`
    Implicit,
}

/// Returns the module the `ctstate` option is rendered against.
///
/// `conntrack` wins over `state` when both are listed.
///
/// # Examples
///
/// ```
/// use iptables_reconcile::core::rule_constraints::{ctstate_module, CtstateModule};
///
/// assert_eq!(ctstate_module(&[]), CtstateModule::Implicit);
/// assert_eq!(
///     ctstate_module(&["state".to_string(), "conntrack".to_string()]),
///     CtstateModule::Conntrack
/// );
/// ```
pub fn ctstate_module(matches: &[String]) -> CtstateModule {
    if match_module_loaded(matches, "conntrack") {
        CtstateModule::Conntrack
    } else if match_module_loaded(matches, "state") {
        CtstateModule::State
    } else {
        CtstateModule::Implicit
    }
}

/// Returns `true` if the rule uses a port option without naming a protocol.
///
/// iptables only accepts `--sport`/`--dport` once a protocol (or a protocol
/// match module) is given. This is advisory: the rule is still passed through
/// so that the tool reports the definitive error.
pub fn ports_without_protocol(body: &RuleBody) -> bool {
    let has_ports = body.source_port.is_some() || body.destination_port.is_some();
    let has_protocol = body.protocol.is_some()
        || ["tcp", "udp", "sctp", "dccp", "multiport"]
            .iter()
            .any(|m| match_module_loaded(&body.matches, m));
    has_ports && !has_protocol
}

// ═══════════════════════════════════════════════════════════════════════════
// Aggregate Check
// ═══════════════════════════════════════════════════════════════════════════

/// Rejects contradictory option combinations in a rule body.
///
/// # Errors
///
/// Returns [`Error::Validation`] naming the offending field.
pub fn check_body(body: &RuleBody) -> Result<()> {
    if body.reject_with.is_some() && !reject_with_compatible(body.jump.as_deref()) {
        return Err(Error::validation(
            "reject_with",
            format!(
                "reject_with requires jump=REJECT, got jump={}",
                body.jump.as_deref().unwrap_or_default()
            ),
        ));
    }

    if jump_conflicts_with_goto(body.effective_jump(), body.goto.as_deref()) {
        return Err(Error::validation(
            "goto",
            "jump (or reject_with) and goto are mutually exclusive",
        ));
    }

    if dscp_options_conflict(
        body.set_dscp_mark.as_deref(),
        body.set_dscp_mark_class.as_deref(),
    ) {
        return Err(Error::validation(
            "set_dscp_mark_class",
            "set_dscp_mark and set_dscp_mark_class are mutually exclusive",
        ));
    }

    if ports_without_protocol(body) {
        warn!("Port options given without a protocol; iptables will likely reject the rule");
    }

    Ok(())
}
