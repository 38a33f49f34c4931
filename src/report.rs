//! JSON outcome report written to stdout
//!
//! Success:
//!
//! ```json
//! {"changed": true, "failed": false, "probe_commands": [[...]], "executed_commands": [[...]]}
//! ```
//!
//! Failure carries `msg`, and for a failed mutation also the command, its exit
//! code and its stderr verbatim.

use crate::core::error::{Error, IptablesErrorPattern, Result};
use crate::core::reconcile::Outcome;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub changed: bool,
    pub failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rc: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
    pub probe_commands: Vec<Vec<String>>,
    pub executed_commands: Vec<Vec<String>>,
}

impl Report {
    pub fn from_outcome(outcome: Outcome) -> Self {
        Self {
            changed: outcome.changed,
            failed: false,
            msg: None,
            cmd: None,
            rc: None,
            stderr: None,
            hints: Vec::new(),
            probe_commands: outcome.probe_commands,
            executed_commands: outcome.executed_commands,
        }
    }

    pub fn from_error(error: &Error) -> Self {
        let mut report = Self {
            changed: false,
            failed: true,
            msg: Some(error.to_string()),
            cmd: None,
            rc: None,
            stderr: None,
            hints: Vec::new(),
            probe_commands: Vec::new(),
            executed_commands: Vec::new(),
        };

        if let Error::Mutation {
            stderr,
            exit_code,
            command,
            ..
        } = error
        {
            report.cmd = Some(command.clone());
            report.rc = Some(*exit_code);
            report.stderr = Some(stderr.clone());
            report.hints = IptablesErrorPattern::match_error(stderr).suggestions;
        }

        report
    }

    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the report cannot be encoded.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_report_shape() {
        let report = Report::from_outcome(Outcome {
            changed: true,
            probe_commands: vec![vec!["iptables".to_string(), "-C".to_string()]],
            executed_commands: vec![],
        });
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["changed"], true);
        assert_eq!(value["failed"], false);
        assert!(value.get("msg").is_none());
        assert_eq!(value["executed_commands"], serde_json::json!([]));
        assert_eq!(value["probe_commands"][0][1], "-C");
    }

    #[test]
    fn test_mutation_report_carries_stderr() {
        let error = Error::Mutation {
            message: "iptables: No chain/target/match by that name.".to_string(),
            stderr: "iptables: No chain/target/match by that name.\n".to_string(),
            exit_code: 1,
            command: vec!["iptables".to_string(), "-A".to_string(), "NOPE".to_string()],
        };
        let report = Report::from_error(&error);
        assert!(report.failed);
        assert!(!report.changed);
        assert_eq!(report.rc, Some(1));
        assert_eq!(
            report.stderr.as_deref(),
            Some("iptables: No chain/target/match by that name.\n")
        );
        assert!(report.hints.iter().any(|h| h.contains("case-sensitive")));
    }

    #[test]
    fn test_validation_report() {
        let report = Report::from_error(&Error::validation("chain", "required"));
        assert_eq!(
            report.msg.as_deref(),
            Some("Validation error in chain: required")
        );
        assert!(report.cmd.is_none());
    }
}
