//! Server configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ServerError;

/// Configuration for the cohort server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    pub bind: SocketAddr,

    /// Path to the embedded database file
    pub database: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8780)),
            database: PathBuf::from("cohort.db"),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file; missing keys fall back to
    /// the defaults.
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ServerError::Config {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&raw).map_err(|error| ServerError::InvalidConfig(error.to_string()))
    }
}
