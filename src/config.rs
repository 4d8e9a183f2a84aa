//! Launcher configuration
//!
//! Only the `[xwayland]` section of the compositor configuration is consumed;
//! every other section is ignored.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Compiled-in location of the X server binary
pub const DEFAULT_XSERVER_PATH: &str = "/usr/bin/Xwayland";

/// Compositor configuration, as far as the launcher is concerned
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub xwayland: XwaylandSection,
}

/// The `[xwayland]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct XwaylandSection {
    /// X server binary, absolute path or a name looked up in `PATH`
    #[serde(default = "default_xserver_path")]
    pub path: PathBuf,

    /// Pass `-ac` to the X server
    #[serde(default)]
    pub disable_access_control: bool,
}

fn default_xserver_path() -> PathBuf {
    PathBuf::from(DEFAULT_XSERVER_PATH)
}

impl Default for XwaylandSection {
    fn default() -> Self {
        Self {
            path: default_xserver_path(),
            disable_access_control: false,
        }
    }
}

impl XwaylandSection {
    /// Resolve the configured server into something exec can run.
    ///
    /// Paths containing a separator are used as given. Bare names are
    /// looked up in `PATH`.
    pub fn resolve_server_path(&self) -> Result<PathBuf> {
        if self.path.components().count() > 1 || self.path.is_absolute() {
            return Ok(self.path.clone());
        }

        which::which(&self.path)
            .map_err(|e| Error::ServerNotFound(format!("{}: {}", self.path.display(), e)))
    }
}

/// Default configuration file location
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("xwayland-launcher"))
        .unwrap_or_else(|| PathBuf::from(".config/xwayland-launcher"))
        .join("config.toml")
}

/// Read configuration from the default location, falling back to defaults
pub fn read_config() -> Result<Config> {
    read_config_or_default(&default_config_path())
}

/// Read configuration from `path`, or the defaults if there is no file there
pub fn read_config_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!("No launcher config at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    read_config_from_path(path)
}

/// Read configuration from a specific path
pub fn read_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

    tracing::debug!(
        path = %config.xwayland.path.display(),
        disable_access_control = config.xwayland.disable_access_control,
        "Loaded xwayland config"
    );

    Ok(config)
}
