//! Rule specification: raw parameters and their validated form
//!
//! [`RuleParams`] is the flat, stringly-typed input exactly as a caller supplies
//! it (JSON params file or command-line flags). [`RuleSpec::from_params`] turns it
//! into an immutable [`RuleSpec`] tagged with one of three modes:
//!
//! - [`Mode::Rule`] - reconcile the presence or absence of a single rule
//! - [`Mode::Policy`] - reconcile a built-in chain's default target
//! - [`Mode::Flush`] - delete every rule of a chain or a whole table
//!
//! All validation happens here, before any external command runs.
//!
//! # Negation
//!
//! Scalar match options accept a leading `!` (`"! eth0"`, `"!10.0.0.0/8"`),
//! which inverts the match. The negation is kept next to the value in a
//! [`Negatable`] and rendered as a standalone `!` token before the flag.
//!
//! # Example
//!
//! ```
//! use iptables_reconcile::core::rule::{Mode, RuleParams, RuleSpec, Table};
//!
//! let params = RuleParams {
//!     chain: Some("INPUT".to_string()),
//!     protocol: Some("tcp".to_string()),
//!     destination_port: Some("22".to_string()),
//!     jump: Some("ACCEPT".to_string()),
//!     ..RuleParams::default()
//! };
//! let spec = RuleSpec::from_params(&params).unwrap();
//! assert_eq!(spec.table(), Table::Filter);
//! assert!(matches!(spec.mode(), Mode::Rule { .. }));
//! ```

use crate::core::error::{Error, Result};
use crate::core::rule_constraints;
use crate::validators;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;
use strum::IntoEnumIterator;
use tracing::warn;

/// Netfilter table a rule or policy lives in
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum Table {
    #[default]
    #[strum(serialize = "filter")]
    Filter,
    #[strum(serialize = "nat")]
    Nat,
    #[strum(serialize = "mangle")]
    Mangle,
    #[strum(serialize = "raw")]
    Raw,
    #[strum(serialize = "security")]
    Security,
}

/// Which address families a specification targets
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum IpVersion {
    #[default]
    #[strum(serialize = "ipv4")]
    Ipv4,
    #[strum(serialize = "ipv6")]
    Ipv6,
    #[strum(serialize = "both")]
    Both,
}

impl IpVersion {
    /// Families to reconcile, in execution order.
    pub const fn families(self) -> &'static [Family] {
        match self {
            IpVersion::Ipv4 => &[Family::V4],
            IpVersion::Ipv6 => &[Family::V6],
            IpVersion::Both => &[Family::V4, Family::V6],
        }
    }
}

/// A single address family; each one has its own binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum Family {
    #[strum(serialize = "ipv4")]
    V4,
    #[strum(serialize = "ipv6")]
    V6,
}

impl Family {
    /// Name of the external tool for this family
    pub const fn binary_name(self) -> &'static str {
        match self {
            Family::V4 => "iptables",
            Family::V6 => "ip6tables",
        }
    }

    /// Flag selecting the ICMP type match for this family
    pub const fn icmp_type_flag(self) -> &'static str {
        match self {
            Family::V4 => "--icmp-type",
            Family::V6 => "--icmpv6-type",
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum Action {
    #[default]
    #[strum(serialize = "append")]
    Append,
    #[strum(serialize = "insert")]
    Insert,
    #[strum(serialize = "flush")]
    Flush,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum State {
    #[default]
    #[strum(serialize = "present")]
    Present,
    #[strum(serialize = "absent")]
    Absent,
}

/// Default target of a built-in chain
///
/// Compared case-sensitively against the `(policy X)` text of a chain listing.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum Policy {
    #[strum(serialize = "ACCEPT")]
    Accept,
    #[strum(serialize = "DROP")]
    Drop,
    #[strum(serialize = "QUEUE")]
    Queue,
    #[strum(serialize = "RETURN")]
    Return,
}

/// Tri-state for flag-only matches such as `--syn` and `-f`
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum MatchToggle {
    /// Option not part of the rule
    #[default]
    #[strum(serialize = "ignore")]
    Ignore,
    #[strum(serialize = "match")]
    Match,
    /// Emitted as `! <flag>`
    #[strum(serialize = "negate")]
    Negate,
}

impl MatchToggle {
    pub const fn is_set(self) -> bool {
        !matches!(self, MatchToggle::Ignore)
    }
}

/// A match value with an optional inversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negatable {
    pub value: String,
    pub negated: bool,
}

impl Negatable {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            negated: false,
        }
    }

    pub fn negated(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            negated: true,
        }
    }

    /// Parses `"value"` or `"! value"` / `"!value"`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if nothing remains after the `!`.
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let trimmed = raw.trim();
        let (negated, value) = match trimmed.strip_prefix('!') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, trimmed),
        };
        if value.is_empty() {
            return Err("value must not be empty".to_string());
        }
        Ok(Self {
            value: value.to_string(),
            negated,
        })
    }
}

impl fmt::Display for Negatable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "! {}", self.value)
        } else {
            f.write_str(&self.value)
        }
    }
}

/// Raw `tcp_flags` parameter
///
/// JSON documents give the lists (`{"flags": [...], "flags_set": [...]}`). The
/// command line gives the text form `"MASK COMP"`, which is kept verbatim and
/// only split during validation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TcpFlagsParams {
    Lists(TcpFlagLists),
    Text(String),
}

/// The examined mask and the flags that must be set
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TcpFlagLists {
    pub flags: Vec<String>,
    pub flags_set: Vec<String>,
}

impl FromStr for TcpFlagsParams {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::Text(s.to_string()))
    }
}

impl TcpFlagsParams {
    /// Splits the text form `"MASK COMP"`, e.g. `"SYN,ACK,FIN,RST SYN"`.
    ///
    /// # Errors
    ///
    /// Returns a message when the text has more than two words.
    pub fn lists(&self) -> std::result::Result<TcpFlagLists, String> {
        let text = match self {
            Self::Lists(lists) => return Ok(lists.clone()),
            Self::Text(text) => text,
        };
        let split = |list: &str| -> Vec<String> {
            list.split(',')
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect()
        };
        match text.split_whitespace().collect::<Vec<_>>().as_slice() {
            [] => Ok(TcpFlagLists::default()),
            [mask] => Ok(TcpFlagLists {
                flags: split(mask),
                flags_set: Vec::new(),
            }),
            [mask, comp] => Ok(TcpFlagLists {
                flags: split(mask),
                flags_set: split(comp),
            }),
            _ => Err(format!(
                "expected 'MASK COMP', e.g. 'SYN,ACK,FIN,RST SYN', got '{text}'"
            )),
        }
    }
}

/// Validated `--tcp-flags` arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpFlags {
    pub mask: Vec<String>,
    pub comp: Vec<String>,
}

/// Validated `-c` counter initialisation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub packets: u64,
    pub bytes: u64,
}

/// Raw caller-supplied parameters
///
/// Every field is optional. The struct doubles as a JSON document shape and as a
/// group of command-line flags, so both front ends share one vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, clap::Args)]
#[serde(default, deny_unknown_fields)]
pub struct RuleParams {
    /// Table to operate on (filter, nat, mangle, raw, security)
    #[arg(long)]
    pub table: Option<String>,
    /// Whether the rule should be present or absent
    #[arg(long)]
    pub state: Option<String>,
    /// append, insert or flush
    #[arg(long)]
    pub action: Option<String>,
    /// ipv4, ipv6 or both
    #[arg(long)]
    pub ip_version: Option<String>,
    /// Chain to operate on (case-sensitive)
    #[arg(long)]
    pub chain: Option<String>,
    #[arg(long)]
    pub protocol: Option<String>,
    #[arg(long)]
    pub source: Option<String>,
    #[arg(long)]
    pub destination: Option<String>,
    /// Match extensions to load, in order (repeatable)
    #[arg(long = "match", value_name = "MODULE")]
    #[serde(rename = "match")]
    pub matches: Vec<String>,
    /// Connection states (comma separated or repeatable)
    #[arg(long, value_delimiter = ',')]
    pub ctstate: Vec<String>,
    #[arg(long)]
    pub limit: Option<String>,
    #[arg(long)]
    #[serde(deserialize_with = "string_or_number")]
    pub limit_burst: Option<String>,
    #[arg(long)]
    #[serde(deserialize_with = "string_or_number")]
    pub uid_owner: Option<String>,
    #[arg(long)]
    #[serde(deserialize_with = "string_or_number")]
    pub gid_owner: Option<String>,
    /// TCP flags as "MASK COMP", e.g. "SYN,ACK,FIN,RST SYN"
    #[arg(long)]
    pub tcp_flags: Option<TcpFlagsParams>,
    /// ignore, match or negate
    #[arg(long)]
    pub syn: Option<String>,
    #[arg(long)]
    pub icmp_type: Option<String>,
    #[arg(long)]
    pub jump: Option<String>,
    #[arg(long)]
    pub log_prefix: Option<String>,
    #[arg(long)]
    pub log_level: Option<String>,
    #[arg(long)]
    pub to_destination: Option<String>,
    #[arg(long)]
    pub to_source: Option<String>,
    #[arg(long)]
    pub goto: Option<String>,
    #[arg(long)]
    pub in_interface: Option<String>,
    #[arg(long)]
    pub out_interface: Option<String>,
    /// ignore, match or negate
    #[arg(long)]
    pub fragment: Option<String>,
    /// Initial counters as "PACKETS BYTES"
    #[arg(long)]
    pub set_counters: Option<String>,
    #[arg(long)]
    #[serde(deserialize_with = "string_or_number")]
    pub source_port: Option<String>,
    #[arg(long)]
    #[serde(deserialize_with = "string_or_number")]
    pub destination_port: Option<String>,
    #[arg(long)]
    #[serde(deserialize_with = "string_or_number")]
    pub to_ports: Option<String>,
    #[arg(long)]
    #[serde(deserialize_with = "string_or_number")]
    pub set_dscp_mark: Option<String>,
    #[arg(long)]
    pub set_dscp_mark_class: Option<String>,
    #[arg(long)]
    pub reject_with: Option<String>,
    #[arg(long)]
    pub comment: Option<String>,
    /// 1-based insert position (action=insert only)
    #[arg(long)]
    #[serde(deserialize_with = "string_or_number")]
    pub rule_num: Option<String>,
    /// Target for the chain's default policy (ACCEPT, DROP, QUEUE, RETURN)
    #[arg(long)]
    pub policy: Option<String>,
    /// Flush the chain, or the whole table when no chain is given
    #[arg(long)]
    pub flush: bool,
    /// Seconds to wait for the xtables lock
    #[arg(long)]
    #[serde(deserialize_with = "string_or_number")]
    pub wait: Option<String>,
}

impl RuleParams {
    /// Names of the populated match and target options, unvalidated.
    pub fn rule_option_fields(&self) -> Vec<&'static str> {
        let checks = [
            ("protocol", self.protocol.is_some()),
            ("source", self.source.is_some()),
            ("destination", self.destination.is_some()),
            ("match", !self.matches.is_empty()),
            ("ctstate", !self.ctstate.is_empty()),
            ("limit", self.limit.is_some()),
            ("limit_burst", self.limit_burst.is_some()),
            ("uid_owner", self.uid_owner.is_some()),
            ("gid_owner", self.gid_owner.is_some()),
            ("tcp_flags", self.tcp_flags.is_some()),
            ("syn", self.syn.is_some()),
            ("icmp_type", self.icmp_type.is_some()),
            ("jump", self.jump.is_some()),
            ("log_prefix", self.log_prefix.is_some()),
            ("log_level", self.log_level.is_some()),
            ("to_destination", self.to_destination.is_some()),
            ("to_source", self.to_source.is_some()),
            ("goto", self.goto.is_some()),
            ("in_interface", self.in_interface.is_some()),
            ("out_interface", self.out_interface.is_some()),
            ("fragment", self.fragment.is_some()),
            ("set_counters", self.set_counters.is_some()),
            ("source_port", self.source_port.is_some()),
            ("destination_port", self.destination_port.is_some()),
            ("to_ports", self.to_ports.is_some()),
            ("set_dscp_mark", self.set_dscp_mark.is_some()),
            ("set_dscp_mark_class", self.set_dscp_mark_class.is_some()),
            ("reject_with", self.reject_with.is_some()),
            ("comment", self.comment.is_some()),
            ("rule_num", self.rule_num.is_some()),
        ];
        checks
            .into_iter()
            .filter_map(|(name, set)| set.then_some(name))
            .collect()
    }
}

/// Accepts `"22"` as well as `22` for numeric-looking parameters.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(text) => text,
        Raw::Number(n) => n.to_string(),
    }))
}

/// The validated match and target options of a rule
///
/// Field order here is the order the options are rendered on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleBody {
    pub protocol: Option<Negatable>,
    pub source: Option<Negatable>,
    pub destination: Option<Negatable>,
    pub matches: Vec<String>,
    pub ctstate: Vec<String>,
    pub limit: Option<String>,
    pub limit_burst: Option<String>,
    pub uid_owner: Option<Negatable>,
    pub gid_owner: Option<Negatable>,
    pub tcp_flags: Option<TcpFlags>,
    pub syn: MatchToggle,
    pub icmp_type: Option<Negatable>,
    pub jump: Option<String>,
    pub log_prefix: Option<String>,
    pub log_level: Option<String>,
    pub to_destination: Option<String>,
    pub to_source: Option<String>,
    pub goto: Option<String>,
    pub in_interface: Option<Negatable>,
    pub out_interface: Option<Negatable>,
    pub fragment: MatchToggle,
    pub set_counters: Option<Counters>,
    pub source_port: Option<Negatable>,
    pub destination_port: Option<Negatable>,
    pub to_ports: Option<String>,
    pub set_dscp_mark: Option<String>,
    pub set_dscp_mark_class: Option<String>,
    pub reject_with: Option<String>,
    pub comment: Option<String>,
}

impl RuleBody {
    /// The `-j` target actually rendered: the explicit jump, or `REJECT` when
    /// only `reject_with` is given.
    pub fn effective_jump(&self) -> Option<&str> {
        match (&self.jump, &self.reject_with) {
            (Some(jump), _) => Some(jump.as_str()),
            (None, Some(_)) => Some("REJECT"),
            (None, None) => None,
        }
    }

    /// Parameter names of every populated option.
    pub fn populated_fields(&self) -> Vec<&'static str> {
        let checks = [
            ("protocol", self.protocol.is_some()),
            ("source", self.source.is_some()),
            ("destination", self.destination.is_some()),
            ("match", !self.matches.is_empty()),
            ("ctstate", !self.ctstate.is_empty()),
            ("limit", self.limit.is_some()),
            ("limit_burst", self.limit_burst.is_some()),
            ("uid_owner", self.uid_owner.is_some()),
            ("gid_owner", self.gid_owner.is_some()),
            ("tcp_flags", self.tcp_flags.is_some()),
            ("syn", self.syn.is_set()),
            ("icmp_type", self.icmp_type.is_some()),
            ("jump", self.jump.is_some()),
            ("log_prefix", self.log_prefix.is_some()),
            ("log_level", self.log_level.is_some()),
            ("to_destination", self.to_destination.is_some()),
            ("to_source", self.to_source.is_some()),
            ("goto", self.goto.is_some()),
            ("in_interface", self.in_interface.is_some()),
            ("out_interface", self.out_interface.is_some()),
            ("fragment", self.fragment.is_set()),
            ("set_counters", self.set_counters.is_some()),
            ("source_port", self.source_port.is_some()),
            ("destination_port", self.destination_port.is_some()),
            ("to_ports", self.to_ports.is_some()),
            ("set_dscp_mark", self.set_dscp_mark.is_some()),
            ("set_dscp_mark_class", self.set_dscp_mark_class.is_some()),
            ("reject_with", self.reject_with.is_some()),
            ("comment", self.comment.is_some()),
        ];
        checks
            .into_iter()
            .filter_map(|(name, set)| set.then_some(name))
            .collect()
    }
}

/// What a rule-mode reconciliation does when the rule is not in its desired state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// `state=present, action=insert`
    InsertPresent { position: Option<u32> },
    /// `state=present, action=append`
    AppendPresent,
    /// `state=absent`
    DeleteAbsent,
}

impl Intent {
    pub const fn wants_present(self) -> bool {
        !matches!(self, Intent::DeleteAbsent)
    }
}

/// Mode tag selecting which reconciliation a specification performs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Rule { intent: Intent, body: RuleBody },
    Policy(Policy),
    Flush,
}

/// Validated, immutable description of one reconciliation target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSpec {
    table: Table,
    chain: Option<String>,
    ip_version: IpVersion,
    wait: Option<u32>,
    mode: Mode,
}

impl RuleSpec {
    /// Validates and normalizes raw parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the offending parameter when:
    /// - an enumerated parameter has an unknown value
    /// - `policy` is combined with flushing or with rule options
    /// - no chain is given outside a table-wide flush
    /// - a field-level check fails (chain name, interface, comment, ...)
    /// - options conflict (see [`rule_constraints`])
    pub fn from_params(params: &RuleParams) -> Result<Self> {
        let table = parse_choice::<Table>("table", params.table.as_deref())?.unwrap_or_default();
        let ip_version =
            parse_choice::<IpVersion>("ip_version", params.ip_version.as_deref())?.unwrap_or_default();
        let action =
            parse_choice::<Action>("action", params.action.as_deref())?.unwrap_or_default();
        let state = parse_choice::<State>("state", params.state.as_deref())?.unwrap_or_default();

        let chain = params
            .chain
            .as_deref()
            .map(validators::validate_chain_name)
            .transpose()
            .map_err(|msg| Error::validation("chain", msg))?;

        let wait = params
            .wait
            .as_deref()
            .map(validators::validate_wait)
            .transpose()
            .map_err(|msg| Error::validation("wait", msg))?;

        let flush = params.flush || action == Action::Flush;

        if flush && params.policy.is_some() {
            return Err(Error::validation(
                "policy",
                "policy and flush are mutually exclusive",
            ));
        }

        if flush {
            let ignored = params.rule_option_fields();
            if !ignored.is_empty() {
                warn!("Ignoring rule options while flushing: {}", ignored.join(", "));
            }
            return Ok(Self {
                table,
                chain,
                ip_version,
                wait,
                mode: Mode::Flush,
            });
        }

        let body = build_body(params)?;

        let mode = if let Some(raw_policy) = params.policy.as_deref() {
            let policy = parse_choice::<Policy>("policy", Some(raw_policy))?
                .ok_or_else(|| Error::validation("policy", "policy must not be empty"))?;

            let mut conflicts = body.populated_fields();
            if params.rule_num.is_some() {
                conflicts.push("rule_num");
            }
            if action == Action::Insert {
                conflicts.push("action");
            }
            if state == State::Absent {
                conflicts.push("state");
            }
            if !conflicts.is_empty() {
                return Err(Error::validation(
                    "policy",
                    format!(
                        "policy cannot be combined with rule options: {}",
                        conflicts.join(", ")
                    ),
                ));
            }
            if chain.is_none() {
                return Err(Error::validation("chain", "policy requires a chain"));
            }
            Mode::Policy(policy)
        } else {
            if chain.is_none() {
                return Err(Error::validation(
                    "chain",
                    "a chain is required unless flushing a whole table",
                ));
            }
            rule_constraints::check_body(&body)?;
            let intent = normalize_intent(action, state, params.rule_num.as_deref())?;
            Mode::Rule { intent, body }
        };

        Ok(Self {
            table,
            chain,
            ip_version,
            wait,
            mode,
        })
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn chain(&self) -> Option<&str> {
        self.chain.as_deref()
    }

    pub fn ip_version(&self) -> IpVersion {
        self.ip_version
    }

    pub fn wait(&self) -> Option<u32> {
        self.wait
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    /// Rule options, in rule mode only.
    pub fn body(&self) -> Option<&RuleBody> {
        match &self.mode {
            Mode::Rule { body, .. } => Some(body),
            _ => None,
        }
    }
}

fn normalize_intent(action: Action, state: State, rule_num: Option<&str>) -> Result<Intent> {
    let position = rule_num
        .map(validators::validate_rule_num)
        .transpose()
        .map_err(|msg| Error::validation("rule_num", msg))?;

    let intent = match (state, action) {
        (State::Absent, _) => Intent::DeleteAbsent,
        (State::Present, Action::Insert) => Intent::InsertPresent { position },
        (State::Present, _) => Intent::AppendPresent,
    };

    if position.is_some() && !matches!(intent, Intent::InsertPresent { .. }) {
        warn!("rule_num only applies to action=insert; ignoring it");
    }

    Ok(intent)
}

fn parse_choice<T>(field: &str, raw: Option<&str>) -> Result<Option<T>>
where
    T: FromStr + IntoEnumIterator + fmt::Display,
{
    let Some(raw) = raw else {
        return Ok(None);
    };
    raw.trim().parse::<T>().map(Some).map_err(|_| {
        let choices: Vec<String> = T::iter().map(|c| c.to_string()).collect();
        Error::validation(
            field,
            format!("'{raw}' is not one of: {}", choices.join(", ")),
        )
    })
}

fn negatable(field: &str, raw: Option<&str>) -> Result<Option<Negatable>> {
    raw.map(Negatable::parse)
        .transpose()
        .map_err(|msg| Error::validation(field, msg))
}

fn plain(field: &str, raw: Option<&str>) -> Result<Option<String>> {
    match raw.map(str::trim) {
        Some("") => Err(Error::validation(field, "value must not be empty")),
        Some(value) => Ok(Some(value.to_string())),
        None => Ok(None),
    }
}

fn interface(field: &str, raw: Option<&str>) -> Result<Option<Negatable>> {
    let Some(iface) = negatable(field, raw)? else {
        return Ok(None);
    };
    validators::validate_interface(&iface.value).map_err(|msg| Error::validation(field, msg))?;
    Ok(Some(iface))
}

fn build_body(params: &RuleParams) -> Result<RuleBody> {
    let tcp_flags = match &params.tcp_flags {
        None => None,
        Some(raw) => {
            let lists = raw
                .lists()
                .map_err(|msg| Error::validation("tcp_flags", msg))?;
            if lists.flags.is_empty() {
                return Err(Error::validation(
                    "tcp_flags",
                    "flags (the examined mask) must not be empty",
                ));
            }
            Some(TcpFlags {
                mask: lists.flags,
                comp: if lists.flags_set.is_empty() {
                    vec!["NONE".to_string()]
                } else {
                    lists.flags_set
                },
            })
        }
    };

    let set_counters = params
        .set_counters
        .as_deref()
        .map(validators::validate_counters)
        .transpose()
        .map_err(|msg| Error::validation("set_counters", msg))?
        .map(|(packets, bytes)| Counters { packets, bytes });

    let comment = params
        .comment
        .as_deref()
        .map(validators::validate_comment)
        .transpose()
        .map_err(|msg| Error::validation("comment", msg))?;

    let log_prefix = params
        .log_prefix
        .as_deref()
        .map(validators::validate_log_prefix)
        .transpose()
        .map_err(|msg| Error::validation("log_prefix", msg))?;

    let toggle = |field: &str, raw: Option<&str>| -> Result<MatchToggle> {
        Ok(parse_choice::<MatchToggle>(field, raw)?.unwrap_or_default())
    };

    let clean_list = |list: &[String]| -> Vec<String> {
        list.iter()
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    };

    Ok(RuleBody {
        protocol: negatable("protocol", params.protocol.as_deref())?,
        source: negatable("source", params.source.as_deref())?,
        destination: negatable("destination", params.destination.as_deref())?,
        matches: clean_list(&params.matches),
        ctstate: clean_list(&params.ctstate),
        limit: plain("limit", params.limit.as_deref())?,
        limit_burst: plain("limit_burst", params.limit_burst.as_deref())?,
        uid_owner: negatable("uid_owner", params.uid_owner.as_deref())?,
        gid_owner: negatable("gid_owner", params.gid_owner.as_deref())?,
        tcp_flags,
        syn: toggle("syn", params.syn.as_deref())?,
        icmp_type: negatable("icmp_type", params.icmp_type.as_deref())?,
        jump: plain("jump", params.jump.as_deref())?,
        log_prefix,
        log_level: plain("log_level", params.log_level.as_deref())?,
        to_destination: plain("to_destination", params.to_destination.as_deref())?,
        to_source: plain("to_source", params.to_source.as_deref())?,
        goto: plain("goto", params.goto.as_deref())?,
        in_interface: interface("in_interface", params.in_interface.as_deref())?,
        out_interface: interface("out_interface", params.out_interface.as_deref())?,
        fragment: toggle("fragment", params.fragment.as_deref())?,
        set_counters,
        source_port: negatable("source_port", params.source_port.as_deref())?,
        destination_port: negatable("destination_port", params.destination_port.as_deref())?,
        to_ports: plain("to_ports", params.to_ports.as_deref())?,
        set_dscp_mark: plain("set_dscp_mark", params.set_dscp_mark.as_deref())?,
        set_dscp_mark_class: plain("set_dscp_mark_class", params.set_dscp_mark_class.as_deref())?,
        reject_with: plain("reject_with", params.reject_with.as_deref())?,
        comment,
    })
}
