use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ZkmError;

/// Top-level client configuration (loaded from zkm.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZkmConfig {
    pub oidc: OidcConfig,
    pub prover: ProverConfig,
    pub session: SessionConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

impl ZkmConfig {
    /// Read and parse a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ZkmError> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| ZkmError::Config(format!("parsing {}: {e}", path.display())))
    }
}

/// OpenID-Connect identity provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcConfig {
    /// Authorization endpoint the login redirect points at
    pub auth_url: String,
    /// OAuth client id registered with the provider (becomes the `aud` claim)
    pub client_id: String,
    /// Where the provider sends the browser back with the id_token
    pub redirect_uri: String,
    /// Extra scopes beyond `openid`
    pub extra_scopes: Vec<String>,
}

/// Proof service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProverConfig {
    /// Proof service endpoint (POST target)
    pub url: String,
    /// Request timeout in seconds (proof generation can take several seconds)
    pub timeout_secs: u64,
}

/// Ephemeral session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of epochs past the current one that a session stays valid
    pub validity_window_epochs: u64,
}

/// Local secret store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend: "file", "keychain", or "memory"
    pub backend: String,
    /// Directory for the file backend
    pub dir: PathBuf,
    /// Service name used for platform keychain entries
    pub keychain_service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".into(),
            client_id: String::new(),
            redirect_uri: "http://localhost:5173/auth/callback".into(),
            extra_scopes: Vec::new(),
        }
    }
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8001/v1".into(),
            timeout_secs: 30,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            validity_window_epochs: 2,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "file".into(),
            dir: PathBuf::from("~/.local/share/zkm"),
            keychain_service: "zkmart".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
