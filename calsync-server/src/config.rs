//! Server configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use calsync_core::SyncConfig;
use config::{Config, Environment, File};
use serde::Deserialize;

pub const DEFAULT_PORT: u16 = 4096;

fn default_bind() -> String {
    format!("127.0.0.1:{DEFAULT_PORT}")
}

/// Configuration at ~/.config/calsync/config.toml, overridable with
/// `CALSYNC_*` environment variables (`CALSYNC_SYNC__FETCH_TIMEOUT=10s`).
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// TOML file with the connections and customers to serve.
    #[serde(default)]
    pub data_file: Option<PathBuf>,

    #[serde(default)]
    pub sync: SyncConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_bind(),
            data_file: None,
            sync: SyncConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("calsync");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from `path`, or the default location when `None`. A missing file
    /// is fine; defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from(path, Self::environment())
    }

    /// `CALSYNC_BIND`, `CALSYNC_SYNC__FETCH_TIMEOUT`, ...
    fn environment() -> Environment {
        Environment::with_prefix("CALSYNC")
            .prefix_separator("_")
            .separator("__")
    }

    fn load_from(path: Option<&Path>, environment: Environment) -> Result<Self> {
        let path = match path {
            Some(path) => expand(path),
            None => Self::config_path()?,
        };

        let config: ServerConfig = Config::builder()
            .add_source(File::from(path.as_path()).required(false))
            .add_source(environment)
            .build()
            .with_context(|| format!("Could not read config from {}", path.display()))?
            .try_deserialize()
            .context("Invalid configuration")?;

        Ok(config)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .with_context(|| format!("Invalid bind address '{}'", self.bind))
    }

    /// The data file path with `~` expanded.
    pub fn data_path(&self) -> Option<PathBuf> {
        self.data_file.as_deref().map(expand)
    }
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}
