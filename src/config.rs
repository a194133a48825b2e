//! Command-line defaults loaded from a TOML file.
//!
//! The file lives at `$BLUEPAIR_CONFIG` if set, otherwise at `bluepair/config.toml` in the user's
//! configuration directory. A missing file yields [`Config::default`].

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{address::Address, controller::DEFAULT_CONNECT_ATTEMPTS, Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Adapter used when `--adapter` is not given (eg. `hci0`).
    #[serde(default)]
    pub adapter: Option<String>,

    /// Device address used when neither `--device` nor `--device-name` is given.
    #[serde(default)]
    pub device: Option<Address>,

    /// Number of `Connect` calls `auto` makes before giving up.
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

const fn default_connect_attempts() -> u32 {
    DEFAULT_CONNECT_ATTEMPTS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            adapter: None,
            device: None,
            connect_attempts: default_connect_attempts(),
        }
    }
}

impl Config {
    /// Loads the configuration from its default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Loads the configuration from `path`, falling back to defaults if the file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("no configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(Error::from)?;
        let config: Self = toml::from_str(&contents).map_err(Error::from)?;
        if config.connect_attempts == 0 {
            return Err(Error::from(format!(
                "{}: connect_attempts must be at least 1",
                path.display()
            )));
        }
        Ok(config)
    }

    pub fn config_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("BLUEPAIR_CONFIG") {
            return Ok(PathBuf::from(path));
        }
        dirs::config_dir()
            .map(|dir| dir.join("bluepair").join("config.toml"))
            .ok_or_else(|| Error::from("unable to locate the configuration directory"))
    }
}
