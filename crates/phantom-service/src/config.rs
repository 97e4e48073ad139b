//! Server configuration
//!
//! Loaded once at startup from a YAML document:
//!
//! ```yaml
//! listen: ":54321"
//! psk: "BASE64-ENCODED-32-BYTE-SECRET"
//! time_window: 30
//! log_level: "info"
//! ```
//!
//! Every key except `psk` has a default; unknown keys are ignored.

use std::{fs, io, path::Path};

use serde::Deserialize;
use thiserror::Error;

/// Default UDP listen address. A bare `":port"` binds every interface.
pub const DEFAULT_LISTEN_ADDR: &str = ":54321";
/// Default session key window in seconds
pub const DEFAULT_TIME_WINDOW: u64 = 30;
/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuration loading error
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading configuration file, {0}")]
    Io(#[from] io::Error),
    #[error("invalid YAML document, {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("psk is required and must not be empty")]
    MissingPsk,
    #[error("time_window must be greater than zero")]
    InvalidTimeWindow,
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_listen")]
    listen: String,
    #[serde(default)]
    psk: String,
    #[serde(default = "default_time_window")]
    time_window: u64,
    #[serde(default = "default_log_level")]
    log_level: String,
}

fn default_listen() -> String {
    DEFAULT_LISTEN_ADDR.to_owned()
}

fn default_time_window() -> u64 {
    DEFAULT_TIME_WINDOW
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_owned()
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// UDP listen address, `host:port` or `:port`
    pub listen: String,
    /// Base64-encoded 32-byte pre-shared secret
    pub psk: String,
    /// Session key window in seconds
    pub time_window: u64,
    /// `debug`, `info` or `error`
    pub log_level: String,
}

impl Config {
    /// Loads configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = fs::read_to_string(path)?;
        Config::load_from_str(&content)
    }

    /// Loads configuration from a YAML document
    pub fn load_from_str(content: &str) -> Result<Config, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(content)?;

        if raw.psk.is_empty() {
            return Err(ConfigError::MissingPsk);
        }
        if raw.time_window == 0 {
            return Err(ConfigError::InvalidTimeWindow);
        }

        Ok(Config {
            listen: raw.listen,
            psk: raw.psk,
            time_window: raw.time_window,
            log_level: raw.log_level,
        })
    }

    /// The listen address with the `":port"` shorthand expanded
    pub fn listen_addr(&self) -> String {
        if self.listen.starts_with(':') {
            format!("0.0.0.0{}", self.listen)
        } else {
            self.listen.clone()
        }
    }
}
