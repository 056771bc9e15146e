//! Configuration management

use std::path::Path;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Parameter store configuration
    pub store: StoreConfig,
    /// Gate (credential validation) configuration
    pub gate: GateConfig,
    /// Origin pass-through configuration
    pub origin: OriginConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Parameter store access configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the parameter service
    pub base_url: String,
    /// Name of the record holding the encryption certificate material
    pub encryption_parameter: String,
    /// Name of the record holding the signing certificate material
    pub signing_parameter: String,
    /// Per-request timeout for store calls
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8200".to_string(),
            encryption_parameter: "/authgate/certificates/encryption".to_string(),
            signing_parameter: "/authgate/certificates/signing".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Credential validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Issuers whose tokens are trusted (exact match, must be non-empty)
    pub allowed_issuers: Vec<String>,
    /// Header set to the verified subject on forwarded requests
    pub user_id_header: String,
    /// Header set to the verified email on forwarded requests
    pub user_email_header: String,
    /// Paths that bypass the gate (default: `["/health"]`)
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

fn default_public_paths() -> Vec<String> {
    vec!["/health".to_string()]
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            allowed_issuers: Vec::new(),
            user_id_header: "x-user-id".to_string(),
            user_email_header: "x-user-email".to_string(),
            public_paths: default_public_paths(),
        }
    }
}

/// Origin pass-through configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OriginConfig {
    /// Upstream base URL authorized requests are forwarded to. When unset,
    /// the built-in demo origin answers instead.
    pub url: Option<String>,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be
    /// parsed, or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("AUTHGATE_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer allow-list is empty.
    pub fn validate(&self) -> Result<()> {
        if self.gate.allowed_issuers.is_empty() {
            return Err(Error::Config(
                "gate.allowed_issuers must list at least one trusted issuer".to_string(),
            ));
        }
        Ok(())
    }
}
