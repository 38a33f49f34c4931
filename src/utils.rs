//! Utility functions for directory lookup and system integration
//!
//! Follows the XDG Base Directory specification for the settings file location:
//!
//! - Config: `~/.config/iptables-reconcile/config.json`
//!
//! Binary lookup searches `PATH` first and then the `sbin` directories where
//! distributions install iptables, since those are often missing from a
//! non-root user's `PATH`.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Directories searched after `PATH` when looking up iptables binaries.
pub const SBIN_DIRS: &[&str] = &["/sbin", "/usr/sbin", "/usr/local/sbin"];

pub fn get_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "iptables-reconcile", "iptables-reconcile")
        .map(|pd| pd.config_dir().to_path_buf())
}

pub fn get_config_file() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.json"))
}

/// Finds `name` in `PATH`, then in `extra_dirs`, then in [`SBIN_DIRS`].
///
/// Returns the first candidate that is a regular file.
pub fn find_binary(name: &str, extra_dirs: &[PathBuf]) -> Option<PathBuf> {
    let path_dirs = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).collect::<Vec<_>>())
        .unwrap_or_default();

    path_dirs
        .iter()
        .map(PathBuf::as_path)
        .chain(extra_dirs.iter().map(PathBuf::as_path))
        .chain(SBIN_DIRS.iter().map(Path::new))
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// True when running with an effective root uid.
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}
