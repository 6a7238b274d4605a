use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub mod paths {
    //! Path resolution for pex configuration.
    //!
    //! `PEX_HOME` resolution order:
    //! 1. `PEX_HOME` environment variable (if set)
    //! 2. `~/.config/pex` (default)

    use std::path::PathBuf;

    /// Returns the pex home directory.
    ///
    /// Falls back to a relative `.config/pex` when `HOME` is unset.
    pub fn pex_home() -> PathBuf {
        if let Some(home) = std::env::var_os("PEX_HOME") {
            return PathBuf::from(home);
        }

        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_default()
            .join(".config")
            .join("pex")
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        pex_home().join("config.toml")
    }
}

fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of stage panes shown at once.
    pub max_panes: usize,

    /// Delay before re-reading a stage that reported end of output.
    pub eof_poll_ms: u64,

    pub mouse_wheel: bool,

    /// Lines per wheel notch.
    pub mouse_wheel_delta: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_panes: 3,
            eof_poll_ms: 50,
            mouse_wheel: false,
            mouse_wheel_delta: 3,
        }
    }
}

impl Config {
    /// Loads configuration from the default path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Writes the commented default config to `path`, creating parent directories.
    ///
    /// Fails if a file already exists there.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, default_config_template())
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }

    pub fn eof_poll(&self) -> Duration {
        Duration::from_millis(self.eof_poll_ms)
    }
}
