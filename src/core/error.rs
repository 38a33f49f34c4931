use std::path::Path;
use thiserror::Error;

/// Core error types for iptables-reconcile
#[derive(Debug, Error)]
pub enum Error {
    /// The rule specification is contradictory or incomplete
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// The external tool could not be located or started
    #[error("Failed to execute {program}: {message}")]
    Execution { program: String, message: String },

    /// The non-mutating probe produced output we cannot interpret
    #[error("Probe failed: {message}")]
    Probe { message: String },

    /// The mutating command exited non-zero
    #[error("{} error: {message}", tool_name(.command))]
    Mutation {
        message: String,
        stderr: String,
        exit_code: i32,
        command: Vec<String>,
    },

    /// An operation was requested that the rule's mode cannot produce
    #[error("Internal error: {0}")]
    Internal(String),

    /// Settings file could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn probe(message: impl Into<String>) -> Self {
        Self::Probe {
            message: message.into(),
        }
    }

    /// True for failures detected before anything was executed.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

/// File name of the program that failed, e.g. `ip6tables` for `/usr/sbin/ip6tables`.
fn tool_name(command: &[String]) -> &str {
    command
        .first()
        .and_then(|program| Path::new(program).file_name())
        .and_then(|name| name.to_str())
        .unwrap_or("iptables")
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// Database of iptables stderr patterns and their translations
pub struct IptablesErrorPattern;

impl IptablesErrorPattern {
    /// Matches an error message against known patterns and returns a user-friendly translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        if lower.contains("permission denied") || lower.contains("you must be root") {
            return ErrorTranslation::new("Insufficient permissions to modify firewall rules")
                .with_suggestion("Run as root or with CAP_NET_ADMIN")
                .with_suggestion("Check that the iptables binary is not restricted by sudoers");
        }

        if lower.contains("no such file") || lower.contains("command not found") {
            return ErrorTranslation::new("iptables is not installed or not found in PATH")
                .with_suggestion("Install iptables: sudo apt install iptables  (Debian/Ubuntu)")
                .with_suggestion("Or: sudo dnf install iptables  (Fedora/RHEL)")
                .with_suggestion("Or set IPTR_IPTABLES_COMMAND to the binary path");
        }

        if lower.contains("xtables lock") || lower.contains("resource temporarily unavailable") {
            return ErrorTranslation::new("Another process is holding the xtables lock")
                .with_suggestion("Pass --wait so iptables waits for the lock")
                .with_suggestion(
                    "Check for concurrent firewall managers: systemctl status firewalld ufw",
                );
        }

        if lower.contains("no chain/target/match by that name") {
            return ErrorTranslation::new("Chain, target or match does not exist")
                .with_suggestion("Create user-defined chains before adding rules to them")
                .with_suggestion("Chain names are case-sensitive (INPUT, not input)");
        }

        if lower.contains("does a matching rule exist") {
            return ErrorTranslation::new("No matching rule to delete")
                .with_suggestion("The rule was removed concurrently or differs in some option");
        }

        if lower.contains("can't initialize") && lower.contains("table") {
            return ErrorTranslation::new("Table is not available on this host")
                .with_suggestion("Load the kernel module, e.g. sudo modprobe iptable_nat")
                .with_suggestion("Check that the table name is spelled correctly");
        }

        if lower.contains("couldn't load") {
            return ErrorTranslation::new("iptables extension could not be loaded")
                .with_suggestion("Check the spelling of the match or target name")
                .with_suggestion("Some targets are only valid in specific tables (SNAT/DNAT in nat)");
        }

        if lower.contains("bad argument") || lower.contains("unknown option") {
            return ErrorTranslation::new("iptables rejected the rule options")
                .with_suggestion("Port options need a protocol: set protocol to tcp or udp")
                .with_suggestion("Run the same command by hand with -v for details");
        }

        if lower.contains("index of insertion too big") {
            return ErrorTranslation::new("Insert position is past the end of the chain")
                .with_suggestion("Lower rule_num or use action=append");
        }

        // Generic fallback
        ErrorTranslation::new(format!("Firewall error: {msg}"))
            .with_suggestion("Check the detailed error message for more information")
            .with_suggestion("Verify iptables is working: sudo iptables -S")
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iptables_missing_command() {
        let translation = IptablesErrorPattern::match_error("No such file or directory");
        assert!(translation.user_message.contains("not installed"));
        assert!(translation.suggestions.len() >= 3);
    }

    #[test]
    fn test_permission_error() {
        let translation = IptablesErrorPattern::match_error(
            "iptables v1.8.7 (legacy): can't initialize iptables table `filter': Permission denied (you must be root)",
        );
        assert!(translation.user_message.contains("permissions"));
    }

    #[test]
    fn test_missing_chain() {
        let translation = IptablesErrorPattern::match_error(
            "iptables: No chain/target/match by that name.",
        );
        assert!(translation.user_message.contains("does not exist"));
        assert!(
            translation
                .suggestions
                .iter()
                .any(|s| s.contains("case-sensitive"))
        );
    }

    #[test]
    fn test_xtables_lock() {
        let translation = IptablesErrorPattern::match_error(
            "Another app is currently holding the xtables lock. Perhaps you want to use the -w option?",
        );
        assert!(translation.suggestions.iter().any(|s| s.contains("--wait")));
    }

    #[test]
    fn test_generic_fallback_keeps_message() {
        let translation = IptablesErrorPattern::match_error("something odd");
        assert!(translation.user_message.contains("something odd"));
    }

    #[test]
    fn test_mutation_display_names_tool() {
        let err = Error::Mutation {
            message: "Bad argument".to_string(),
            stderr: "Bad argument\n".to_string(),
            exit_code: 2,
            command: vec!["/usr/sbin/ip6tables".to_string(), "-A".to_string()],
        };
        assert_eq!(err.to_string(), "ip6tables error: Bad argument");

        let err = Error::Mutation {
            message: "failed".to_string(),
            stderr: String::new(),
            exit_code: 1,
            command: Vec::new(),
        };
        assert_eq!(err.to_string(), "iptables error: failed");
    }

    #[test]
    fn test_serialization_from_serde() {
        let json_err = serde_json::from_str::<u32>("x").unwrap_err();
        let err: Error = json_err.into();
        assert!(err.to_string().starts_with("JSON error:"));
    }

    #[test]
    fn test_validation_display() {
        let err = Error::validation("chain", "required");
        assert_eq!(err.to_string(), "Validation error in chain: required");
        assert!(err.is_validation());
    }
}
