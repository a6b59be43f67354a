//! Server configuration loaded from a TOML file given on the command line.
//!
//! No environment variables are consulted; the config file is the single
//! source of startup parameters.

use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Port the gRPC server listens on.
    pub port: u16,
    /// Directory job log files are written to. Defaults to the system
    /// temporary directory.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    pub tls: TlsConfig,
    pub acl: AclConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// PEM-encoded certificate.
    pub cert_file: PathBuf,
    /// PEM-encoded private key.
    pub key_file: PathBuf,
    /// PEM-encoded CA certificate used to verify peer certificates.
    pub ca_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AclConfig {
    /// Casbin model file.
    pub model_file: PathBuf,
    /// Casbin policy file.
    pub policy_file: PathBuf,
}

fn default_log_dir() -> PathBuf {
    std::env::temp_dir()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
