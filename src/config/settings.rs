//! Daemon settings.
//!
//! Read once at boot from the TOML file named by `FLEETD_SETTINGS`. Every
//! field has a default, so an absent variable yields a working daemon.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::loader::ConfigError;

/// Environment variable naming the settings file.
pub const SETTINGS_ENV: &str = "FLEETD_SETTINGS";

/// Process-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Topology document candidates, lowest precedence first.
    pub config_paths: Vec<PathBuf>,

    /// Log filter used when `RUST_LOG` is not set.
    pub log_level: String,

    /// Address control listeners bind to.
    pub listen_host: String,

    /// Concurrent connections per listener.
    pub max_connections: usize,

    /// Delay between replication dial attempts in seconds.
    pub replication_retry_secs: u64,

    /// Create or repair bridges that do not match the topology.
    pub fix_network: bool,

    /// Modules whose recorded startup error aborts the process.
    pub abort_on: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_paths: vec![
                PathBuf::from("./config"),
                PathBuf::from("/etc/fleetd/config"),
                PathBuf::from("/etc/default/fleetd"),
            ],
            log_level: "info".to_string(),
            listen_host: "0.0.0.0".to_string(),
            max_connections: 256,
            replication_retry_secs: 10,
            fix_network: false,
            abort_on: vec!["config".to_string(), "server".to_string()],
        }
    }
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read settings from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Settings from `FLEETD_SETTINGS`, or defaults when it is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(SETTINGS_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }
}
