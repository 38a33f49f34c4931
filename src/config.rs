use crate::core::error::{Error, Result};
use crate::utils::get_config_file;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings that control how the external tools are located
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Explicit path to `iptables`; skips the search
    pub iptables_path: Option<PathBuf>,
    /// Explicit path to `ip6tables`; skips the search
    pub ip6tables_path: Option<PathBuf>,
    /// Extra directories searched after `PATH` and before the sbin fallbacks
    pub search_paths: Vec<PathBuf>,
}

/// Loads settings from `path`, or from the default config file when `None`.
///
/// A missing default file yields defaults. An explicitly given file must exist.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file cannot be read or is not valid settings JSON.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => match get_config_file() {
            Some(path) => (path, false),
            None => return Ok(Settings::default()),
        },
    };

    let json = match std::fs::read_to_string(&path) {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
            debug!("No settings file at {}, using defaults", path.display());
            return Ok(Settings::default());
        }
        Err(e) => {
            return Err(Error::Config(format!(
                "cannot read {}: {e}",
                path.display()
            )));
        }
    };

    let settings = serde_json::from_str::<Settings>(&json)
        .map_err(|e| Error::Config(format!("invalid settings in {}: {e}", path.display())))?;
    debug!("Loaded settings from {}", path.display());
    Ok(settings)
}
