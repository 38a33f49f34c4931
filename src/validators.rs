//! Input validation for raw rule parameters
//!
//! These checks run while building a [`crate::core::rule::RuleSpec`], before any
//! external command is executed. They enforce limits iptables itself would
//! reject, so a bad parameter surfaces as a validation error naming the field
//! instead of an opaque tool failure.

/// Maximum length of a chain name accepted by the kernel (`XT_EXTENSION_MAXNAMELEN` - 1).
pub const MAX_CHAIN_NAME_LEN: usize = 28;

/// Maximum length of a `-m comment` payload.
pub const MAX_COMMENT_LEN: usize = 256;

/// Maximum length of a LOG target prefix.
pub const MAX_LOG_PREFIX_LEN: usize = 29;

/// Validates a chain name. Case is preserved.
///
/// # Errors
///
/// Returns `Err` if the name is empty, too long, starts with `-` or `!`,
/// or contains whitespace.
pub fn validate_chain_name(name: &str) -> Result<String, String> {
    if name.is_empty() {
        return Err("Chain name must not be empty".to_string());
    }

    if name.len() > MAX_CHAIN_NAME_LEN {
        return Err(format!(
            "Chain name too long (max {MAX_CHAIN_NAME_LEN} characters)"
        ));
    }

    if name.starts_with('-') || name.starts_with('!') {
        return Err("Chain name must not start with '-' or '!'".to_string());
    }

    if name.chars().any(char::is_whitespace) {
        return Err("Chain name must not contain whitespace".to_string());
    }

    Ok(name.to_string())
}

/// Validates a network interface name.
///
/// Linux kernel interface name rules:
/// - Max 15 characters (IFNAMSIZ - 1)
/// - Alphanumeric, dot, dash, underscore only
/// - Cannot be "." or ".."
///
/// iptables additionally accepts a trailing `+` as a prefix wildcard (`eth+`).
///
/// # Errors
///
/// Returns `Err` if interface name violates kernel constraints.
pub fn validate_interface(name: &str) -> Result<String, String> {
    if name.is_empty() {
        return Err("Interface name must not be empty".to_string());
    }

    if name.len() > 15 {
        return Err("Interface name too long (max 15 characters)".to_string());
    }

    if name == "." || name == ".." {
        return Err("Invalid interface name".to_string());
    }

    let stem = name.strip_suffix('+').unwrap_or(name);
    if !stem
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '@' | ':'))
    {
        return Err("Interface name contains invalid characters".to_string());
    }

    Ok(name.to_string())
}

/// Validates a rule comment.
///
/// The comment is passed as a single argument (no shell involved), so quotes
/// are fine; line breaks are not representable in `iptables -S` output.
///
/// # Errors
///
/// Returns `Err` if the comment is too long or contains control characters.
pub fn validate_comment(comment: &str) -> Result<String, String> {
    if comment.len() > MAX_COMMENT_LEN {
        return Err(format!(
            "Comment too long (max {MAX_COMMENT_LEN} characters)"
        ));
    }

    if comment.chars().any(char::is_control) {
        return Err("Comment must not contain control characters".to_string());
    }

    Ok(comment.to_string())
}

/// Validates a LOG target prefix.
///
/// # Errors
///
/// Returns `Err` if the prefix exceeds the kernel limit.
pub fn validate_log_prefix(prefix: &str) -> Result<String, String> {
    if prefix.len() > MAX_LOG_PREFIX_LEN {
        return Err(format!(
            "Log prefix too long (max {MAX_LOG_PREFIX_LEN} characters)"
        ));
    }
    Ok(prefix.to_string())
}

/// Validates an insert position. Positions are 1-based.
///
/// # Errors
///
/// Returns `Err` if the value is not a positive integer.
pub fn validate_rule_num(raw: &str) -> Result<u32, String> {
    match raw.trim().parse::<u32>() {
        Ok(0) => Err("Rule number must be 1 or greater".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("Rule number '{raw}' is not a positive integer")),
    }
}

/// Validates the xtables lock wait time in seconds.
///
/// # Errors
///
/// Returns `Err` if the value is not a non-negative integer.
pub fn validate_wait(raw: &str) -> Result<u32, String> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| format!("Wait time '{raw}' is not a whole number of seconds"))
}

/// Validates a `set_counters` value of the form `"PKTS BYTES"`.
///
/// # Errors
///
/// Returns `Err` unless the value is exactly two unsigned integers.
pub fn validate_counters(raw: &str) -> Result<(u64, u64), String> {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    let [packets, bytes] = parts.as_slice() else {
        return Err("Counters must be given as 'PACKETS BYTES'".to_string());
    };

    let packets = packets
        .parse::<u64>()
        .map_err(|_| format!("Packet counter '{packets}' is not a number"))?;
    let bytes = bytes
        .parse::<u64>()
        .map_err(|_| format!("Byte counter '{bytes}' is not a number"))?;

    Ok((packets, bytes))
}
