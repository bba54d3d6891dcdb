//! File configuration for a [`Service`](crate::Service).
//!
//! ```ron
//! (
//!     domain: "example.com",
//!     selector: "outpost",
//!     key: File(path: "/etc/outpost/dkim.pem", algorithm: rsa_sha256),
//!     delivery: (
//!         ports: [587, 25],
//!         tls: opportunistic,
//!     ),
//! )
//! ```

use std::path::{Path, PathBuf};

use outpost_delivery::DeliveryConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    error::ServiceError,
    service::Service,
    signing::{DkimAlgorithm, DkimKey, SigningError},
};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "OUTPOST_CONFIG";

const DEFAULT_PATHS: [&str; 2] = ["./outpost.config.ron", "/etc/outpost/outpost.config.ron"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error(transparent)]
    Key(#[from] SigningError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("OUTPOST_CONFIG points to non-existent file: {}", .0.display())]
    MissingEnvPath(PathBuf),

    #[error("No configuration file found. Tried:\n  - OUTPOST_CONFIG environment variable\n{0}")]
    NotFound(String),
}

/// Where the DKIM private key comes from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum KeySource {
    /// A PEM file on disk.
    File {
        path: PathBuf,
        #[serde(default)]
        algorithm: DkimAlgorithm,
    },

    /// PEM text inline in the configuration.
    Pem {
        pem: String,
        #[serde(default)]
        algorithm: DkimAlgorithm,
    },
}

impl KeySource {
    /// Reads and parses the key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if a key file cannot be read and
    /// [`ConfigError::Key`] if its contents are not a usable key.
    pub fn load(&self) -> Result<DkimKey, ConfigError> {
        match self {
            Self::File { path, algorithm } => {
                let pem = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok(DkimKey::from_pem(*algorithm, &pem)?)
            }
            Self::Pem { pem, algorithm } => Ok(DkimKey::from_pem(*algorithm, pem)?),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutpostConfig {
    /// Sending domain: DKIM `d=`, EHLO identity and Message-ID domain.
    pub domain: String,
    pub selector: String,
    pub key: KeySource,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

impl OutpostConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if `content` is not a valid
    /// configuration.
    pub fn from_ron_str(content: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(content)?)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if `path` cannot be read, or a parse
    /// error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron_str(&content)
    }

    /// Loads the key and builds a production [`Service`].
    ///
    /// # Errors
    ///
    /// Fails if the key cannot be loaded or the resolver cannot be created.
    pub fn build_service(&self) -> Result<Service, ConfigError> {
        let key = self.key.load()?;
        let service = Service::builder(self.domain.as_str(), self.selector.as_str())
            .key(key)
            .config(self.delivery.clone())
            .build()?;
        Ok(service)
    }
}

/// Find the configuration file using the following precedence:
/// 1. `OUTPOST_CONFIG` environment variable
/// 2. ./outpost.config.ron (current working directory)
/// 3. /etc/outpost/outpost.config.ron (system-wide config)
///
/// # Errors
///
/// Returns [`ConfigError::MissingEnvPath`] if the environment variable names
/// a file that does not exist, and [`ConfigError::NotFound`] if no candidate
/// exists.
pub fn find_config_file() -> Result<PathBuf, ConfigError> {
    find_config_file_from(std::env::var_os(CONFIG_ENV).map(PathBuf::from))
}

fn find_config_file_from(env_path: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = env_path {
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::MissingEnvPath(path));
    }

    if let Some(path) = DEFAULT_PATHS.iter().map(PathBuf::from).find(|p| p.exists()) {
        return Ok(path);
    }

    let paths_tried = DEFAULT_PATHS
        .iter()
        .map(|p| format!("  - {p}"))
        .collect::<Vec<_>>()
        .join("\n");
    Err(ConfigError::NotFound(paths_tried))
}
