//! Command synthesis
//!
//! Turns a [`RuleSpec`] into the argument vector for one iptables invocation.
//! Output is a plain `Vec<String>`: the first element is the binary, every other
//! element is exactly one argument. Nothing is ever joined or quoted for a shell,
//! so a comment like `this is a comment` travels as a single token.
//!
//! A command has three parts:
//!
//! ```text
//! <binary> -t <table> <operation> [rule body] [-w [secs]]
//! ```
//!
//! The rule body is rendered from [`RULE_BLOCKS`], an ordered table of option
//! blocks. The body depends only on the rule's options and the family, never on
//! the operation, so the check command and the mutating command for the same
//! rule carry identical bodies and `-C` answers exactly what `-A`/`-I`/`-D` would
//! act on.

use crate::core::error::{Error, Result};
use crate::core::rule::{Family, Intent, MatchToggle, Mode, Negatable, RuleBody, RuleSpec};
use crate::core::rule_constraints::{CtstateModule, ctstate_module, match_module_loaded};

/// A single iptables invocation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Operation {
    #[strum(serialize = "check")]
    Check,
    #[strum(serialize = "append")]
    Append,
    #[strum(serialize = "insert")]
    Insert,
    #[strum(serialize = "delete")]
    Delete,
    #[strum(serialize = "list")]
    List,
    #[strum(serialize = "set-policy")]
    SetPolicy,
    #[strum(serialize = "flush")]
    Flush,
}

impl Operation {
    pub const fn flag(self) -> &'static str {
        match self {
            Operation::Check => "-C",
            Operation::Append => "-A",
            Operation::Insert => "-I",
            Operation::Delete => "-D",
            Operation::List => "-L",
            Operation::SetPolicy => "-P",
            Operation::Flush => "-F",
        }
    }

    /// The operation that brings a rule into its desired state.
    pub const fn for_intent(intent: Intent) -> Self {
        match intent {
            Intent::InsertPresent { .. } => Operation::Insert,
            Intent::AppendPresent => Operation::Append,
            Intent::DeleteAbsent => Operation::Delete,
        }
    }
}

/// One contiguous group of tokens in a rule body
pub struct Block {
    pub name: &'static str,
    pub applies: fn(&RuleBody) -> bool,
    pub emit: fn(&RuleBody, Family, &mut Vec<String>),
}

/// Rule body blocks in emission order.
pub const RULE_BLOCKS: &[Block] = &[
    Block {
        name: "protocol",
        applies: |b| b.protocol.is_some(),
        emit: |b, _, out| push_negatable(out, "-p", b.protocol.as_ref()),
    },
    Block {
        name: "source",
        applies: |b| b.source.is_some(),
        emit: |b, _, out| push_negatable(out, "-s", b.source.as_ref()),
    },
    Block {
        name: "destination",
        applies: |b| b.destination.is_some(),
        emit: |b, _, out| push_negatable(out, "-d", b.destination.as_ref()),
    },
    Block {
        name: "match",
        applies: |b| !b.matches.is_empty(),
        emit: |b, _, out| {
            for module in &b.matches {
                out.push("-m".to_string());
                out.push(module.clone());
            }
        },
    },
    Block {
        name: "ctstate",
        applies: |b| !b.ctstate.is_empty(),
        emit: emit_ctstate,
    },
    Block {
        name: "limit",
        applies: |b| b.limit.is_some() || b.limit_burst.is_some(),
        emit: |b, _, out| {
            push_module(out, &b.matches, "limit");
            push_value(out, "--limit", b.limit.as_deref());
            push_value(out, "--limit-burst", b.limit_burst.as_deref());
        },
    },
    Block {
        name: "owner",
        applies: |b| b.uid_owner.is_some() || b.gid_owner.is_some(),
        emit: |b, _, out| {
            push_module(out, &b.matches, "owner");
            push_negatable(out, "--uid-owner", b.uid_owner.as_ref());
            push_negatable(out, "--gid-owner", b.gid_owner.as_ref());
        },
    },
    Block {
        name: "tcp_flags",
        applies: |b| b.tcp_flags.is_some(),
        emit: |b, _, out| {
            if let Some(flags) = &b.tcp_flags {
                out.push("--tcp-flags".to_string());
                out.push(flags.mask.join(","));
                out.push(flags.comp.join(","));
            }
        },
    },
    Block {
        name: "syn",
        applies: |b| b.syn.is_set(),
        emit: |b, _, out| push_toggle(out, "--syn", b.syn),
    },
    Block {
        name: "icmp_type",
        applies: |b| b.icmp_type.is_some(),
        emit: |b, family, out| push_negatable(out, family.icmp_type_flag(), b.icmp_type.as_ref()),
    },
    Block {
        name: "jump",
        applies: |b| b.effective_jump().is_some(),
        emit: |b, _, out| push_value(out, "-j", b.effective_jump()),
    },
    Block {
        name: "log_prefix",
        applies: |b| b.log_prefix.is_some(),
        emit: |b, _, out| push_value(out, "--log-prefix", b.log_prefix.as_deref()),
    },
    Block {
        name: "log_level",
        applies: |b| b.log_level.is_some(),
        emit: |b, _, out| push_value(out, "--log-level", b.log_level.as_deref()),
    },
    Block {
        name: "to_destination",
        applies: |b| b.to_destination.is_some(),
        emit: |b, _, out| push_value(out, "--to-destination", b.to_destination.as_deref()),
    },
    Block {
        name: "to_source",
        applies: |b| b.to_source.is_some(),
        emit: |b, _, out| push_value(out, "--to-source", b.to_source.as_deref()),
    },
    Block {
        name: "goto",
        applies: |b| b.goto.is_some(),
        emit: |b, _, out| push_value(out, "-g", b.goto.as_deref()),
    },
    Block {
        name: "in_interface",
        applies: |b| b.in_interface.is_some(),
        emit: |b, _, out| push_negatable(out, "-i", b.in_interface.as_ref()),
    },
    Block {
        name: "out_interface",
        applies: |b| b.out_interface.is_some(),
        emit: |b, _, out| push_negatable(out, "-o", b.out_interface.as_ref()),
    },
    Block {
        name: "fragment",
        applies: |b| b.fragment.is_set(),
        emit: |b, _, out| push_toggle(out, "-f", b.fragment),
    },
    Block {
        name: "set_counters",
        applies: |b| b.set_counters.is_some(),
        emit: |b, _, out| {
            if let Some(counters) = b.set_counters {
                out.push("-c".to_string());
                out.push(counters.packets.to_string());
                out.push(counters.bytes.to_string());
            }
        },
    },
    Block {
        name: "source_port",
        applies: |b| b.source_port.is_some(),
        emit: |b, _, out| push_negatable(out, "--source-port", b.source_port.as_ref()),
    },
    Block {
        name: "destination_port",
        applies: |b| b.destination_port.is_some(),
        emit: |b, _, out| push_negatable(out, "--destination-port", b.destination_port.as_ref()),
    },
    Block {
        name: "to_ports",
        applies: |b| b.to_ports.is_some(),
        emit: |b, _, out| push_value(out, "--to-ports", b.to_ports.as_deref()),
    },
    Block {
        name: "set_dscp_mark",
        applies: |b| b.set_dscp_mark.is_some(),
        emit: |b, _, out| push_value(out, "--set-dscp", b.set_dscp_mark.as_deref()),
    },
    Block {
        name: "set_dscp_mark_class",
        applies: |b| b.set_dscp_mark_class.is_some(),
        emit: |b, _, out| push_value(out, "--set-dscp-class", b.set_dscp_mark_class.as_deref()),
    },
    Block {
        name: "reject_with",
        applies: |b| b.reject_with.is_some(),
        emit: |b, _, out| push_value(out, "--reject-with", b.reject_with.as_deref()),
    },
    Block {
        name: "comment",
        applies: |b| b.comment.is_some(),
        emit: |b, _, out| {
            push_module(out, &b.matches, "comment");
            push_value(out, "--comment", b.comment.as_deref());
        },
    },
];

fn push_value(out: &mut Vec<String>, flag: &str, value: Option<&str>) {
    if let Some(value) = value {
        out.push(flag.to_string());
        out.push(value.to_string());
    }
}

fn push_negatable(out: &mut Vec<String>, flag: &str, param: Option<&Negatable>) {
    if let Some(param) = param {
        if param.negated {
            out.push("!".to_string());
        }
        out.push(flag.to_string());
        out.push(param.value.clone());
    }
}

fn push_toggle(out: &mut Vec<String>, flag: &str, toggle: MatchToggle) {
    match toggle {
        MatchToggle::Ignore => {}
        MatchToggle::Match => out.push(flag.to_string()),
        MatchToggle::Negate => {
            out.push("!".to_string());
            out.push(flag.to_string());
        }
    }
}

/// Loads a match module unless the caller already listed it.
fn push_module(out: &mut Vec<String>, matches: &[String], name: &str) {
    if !match_module_loaded(matches, name) {
        out.push("-m".to_string());
        out.push(name.to_string());
    }
}

fn emit_ctstate(body: &RuleBody, _: Family, out: &mut Vec<String>) {
    let states = body.ctstate.join(",");
    match ctstate_module(&body.matches) {
        CtstateModule::Conntrack => push_value(out, "--ctstate", Some(&states)),
        CtstateModule::State => push_value(out, "--state", Some(&states)),
        CtstateModule::Implicit => {
            out.push("-m".to_string());
            out.push("conntrack".to_string());
            push_value(out, "--ctstate", Some(&states));
        }
    }
}

/// Renders the rule body for one family.
pub fn rule_body(body: &RuleBody, family: Family) -> Vec<String> {
    let mut tokens = Vec::new();
    for block in RULE_BLOCKS {
        if (block.applies)(body) {
            (block.emit)(body, family, &mut tokens);
        }
    }
    tokens
}

/// Names of the blocks that contribute tokens for this body, in order.
pub fn active_blocks(body: &RuleBody) -> Vec<&'static str> {
    RULE_BLOCKS
        .iter()
        .filter(|block| (block.applies)(body))
        .map(|block| block.name)
        .collect()
}

/// Builds the full argument vector for `operation` against `spec`.
///
/// # Errors
///
/// Returns [`Error::Internal`] if the operation does not exist for the
/// specification's mode (e.g. `SetPolicy` for a rule), or a chain-scoped
/// operation is requested without a chain.
pub fn synthesize(
    spec: &RuleSpec,
    family: Family,
    binary: &str,
    operation: Operation,
) -> Result<Vec<String>> {
    let mut tokens = vec![
        binary.to_string(),
        "-t".to_string(),
        spec.table().to_string(),
        operation.flag().to_string(),
    ];

    let require_chain = || {
        spec.chain().map(str::to_string).ok_or_else(|| {
            Error::Internal(format!("{operation} requires a chain"))
        })
    };

    match (spec.mode(), operation) {
        (Mode::Flush, Operation::Flush) => {
            if let Some(chain) = spec.chain() {
                tokens.push(chain.to_string());
            }
        }
        (Mode::Policy(_), Operation::List) => {
            tokens.push(require_chain()?);
        }
        (Mode::Policy(policy), Operation::SetPolicy) => {
            tokens.push(require_chain()?);
            tokens.push(policy.to_string());
        }
        (
            Mode::Rule { intent, body },
            Operation::Check | Operation::Append | Operation::Insert | Operation::Delete,
        ) => {
            tokens.push(require_chain()?);
            if operation == Operation::Insert
                && let Intent::InsertPresent {
                    position: Some(position),
                } = intent
            {
                tokens.push(position.to_string());
            }
            tokens.extend(rule_body(body, family));
        }
        (mode, operation) => {
            let mode = match mode {
                Mode::Rule { .. } => "rule",
                Mode::Policy(_) => "policy",
                Mode::Flush => "flush",
            };
            return Err(Error::Internal(format!(
                "operation {operation} is not valid in {mode} mode"
            )));
        }
    }

    if let Some(wait) = spec.wait() {
        tokens.push("-w".to_string());
        tokens.push(wait.to_string());
    }

    Ok(tokens)
}
