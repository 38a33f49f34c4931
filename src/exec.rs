//! External command execution and binary resolution
//!
//! The reconciler never spawns processes itself. It talks to two capabilities:
//!
//! - [`CommandRunner`]: runs one argument vector and reports exit code, stdout and stderr
//! - [`BinaryResolver`]: maps an address family to the path of its tool
//!
//! [`SystemRunner`] and [`SystemResolver`] are the production implementations;
//! tests substitute scripted ones.
//!
//! # Environment Variables
//!
//! - `IPTR_IPTABLES_COMMAND`: Path to the `iptables` binary, overriding settings and search
//! - `IPTR_IP6TABLES_COMMAND`: Same for `ip6tables`
//!
//! # Security
//!
//! Commands are executed directly with an argument vector. No shell is involved,
//! so rule values (comments, interface names) are never interpreted.

use crate::config::Settings;
use crate::core::error::{Error, Result};
use crate::core::rule::Family;
use crate::utils::find_binary;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Result of running one external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external commands
pub trait CommandRunner {
    /// Runs `command[0]` with `command[1..]` as arguments.
    ///
    /// A non-zero exit is a normal result, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Execution`] if the process could not be started or
    /// did not exit normally.
    fn run(&mut self, command: &[String]) -> Result<CommandOutput>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &mut R {
    fn run(&mut self, command: &[String]) -> Result<CommandOutput> {
        (**self).run(command)
    }
}

/// Maps an address family to the binary that manages it
pub trait BinaryResolver {
    /// # Errors
    ///
    /// Returns [`Error::Execution`] if no usable binary is found.
    fn resolve(&self, family: Family) -> Result<String>;
}

/// [`CommandRunner`] backed by `std::process::Command`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, command: &[String]) -> Result<CommandOutput> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::Internal("empty command".to_string()))?;

        debug!("Running: {}", command.join(" "));

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| Error::Execution {
                program: program.clone(),
                message: e.to_string(),
            })?;

        let exit_code = output.status.code().ok_or_else(|| Error::Execution {
            program: program.clone(),
            message: "terminated by signal".to_string(),
        })?;

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// [`BinaryResolver`] using environment overrides, settings, then a search
///
/// Resolution order per family:
/// 1. `IPTR_IPTABLES_COMMAND` / `IPTR_IP6TABLES_COMMAND`
/// 2. `iptables_path` / `ip6tables_path` from [`Settings`]
/// 3. `PATH`, then `search_paths`, then the sbin directories
#[derive(Debug, Clone, Default)]
pub struct SystemResolver {
    settings: Settings,
}

impl SystemResolver {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub const fn env_var(family: Family) -> &'static str {
        match family {
            Family::V4 => "IPTR_IPTABLES_COMMAND",
            Family::V6 => "IPTR_IP6TABLES_COMMAND",
        }
    }

    fn configured(&self, family: Family) -> Option<(PathBuf, String)> {
        let env_var = Self::env_var(family);
        if let Some(path) = std::env::var_os(env_var).filter(|p| !p.is_empty()) {
            return Some((PathBuf::from(path), env_var.to_string()));
        }
        let (path, key) = match family {
            Family::V4 => (&self.settings.iptables_path, "iptables_path"),
            Family::V6 => (&self.settings.ip6tables_path, "ip6tables_path"),
        };
        path.clone().map(|p| (p, format!("settings {key}")))
    }
}

impl BinaryResolver for SystemResolver {
    fn resolve(&self, family: Family) -> Result<String> {
        let name = family.binary_name();

        if let Some((path, source)) = self.configured(family) {
            if !path.is_file() {
                return Err(Error::Execution {
                    program: name.to_string(),
                    message: format!("{} (from {source}) does not exist", path.display()),
                });
            }
            debug!("Using {name} from {source}: {}", path.display());
            return Ok(path.to_string_lossy().into_owned());
        }

        let path =
            find_binary(name, &self.settings.search_paths).ok_or_else(|| Error::Execution {
                program: name.to_string(),
                message: "not found in PATH or sbin directories".to_string(),
            })?;
        debug!("Resolved {name} to {}", path.display());
        Ok(path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| (*t).to_string()).collect()
    }

    #[test]
    fn test_system_runner_captures_output() {
        let output = SystemRunner
            .run(&cmd(&["sh", "-c", "echo out; echo err >&2; exit 3"]))
            .unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert!(!output.success());
    }

    #[test]
    fn test_system_runner_missing_program() {
        let err = SystemRunner
            .run(&cmd(&["/nonexistent/iptables", "-L"]))
            .unwrap_err();
        assert!(matches!(err, Error::Execution { ref program, .. } if program == "/nonexistent/iptables"));
    }

    #[test]
    fn test_system_runner_empty_command() {
        assert!(SystemRunner.run(&[]).is_err());
    }

    #[test]
    fn test_resolver_uses_settings_path() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("ip6tables-custom");
        std::fs::write(&bin, "").unwrap();

        let resolver = SystemResolver::new(Settings {
            ip6tables_path: Some(bin.clone()),
            ..Settings::default()
        });
        // IPTR_IP6TABLES_COMMAND is never set by the test suite
        assert_eq!(
            resolver.resolve(Family::V6).unwrap(),
            bin.to_string_lossy()
        );
    }

    #[test]
    fn test_resolver_env_override_wins() {
        let _guard = crate::core::test_helpers::ENV_VAR_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("iptables-from-env");
        std::fs::write(&bin, "").unwrap();

        let resolver = SystemResolver::new(Settings {
            iptables_path: Some(PathBuf::from("/nonexistent/iptables")),
            ..Settings::default()
        });
        unsafe {
            std::env::set_var("IPTR_IPTABLES_COMMAND", &bin);
        }
        let resolved = resolver.resolve(Family::V4);
        unsafe {
            std::env::remove_var("IPTR_IPTABLES_COMMAND");
        }
        assert_eq!(resolved.unwrap(), bin.to_string_lossy());
    }

    #[test]
    fn test_resolver_rejects_missing_configured_path() {
        let resolver = SystemResolver::new(Settings {
            ip6tables_path: Some(PathBuf::from("/nonexistent/ip6tables")),
            ..Settings::default()
        });
        let err = resolver.resolve(Family::V6).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_resolver_searches_extra_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ip6tables"), "").unwrap();

        let resolver = SystemResolver::new(Settings {
            search_paths: vec![dir.path().to_path_buf()],
            ..Settings::default()
        });
        // A host-installed ip6tables on PATH takes precedence
        assert!(resolver.resolve(Family::V6).unwrap().ends_with("ip6tables"));
    }
}
