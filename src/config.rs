//! Client configuration.
//!
//! The configuration map is supplied by the embedding application, either as
//! TOML or as an already-parsed JSON object. Credentials are immutable once
//! loaded.

use crate::campaign_api::types::CampaignError;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Suffix appended to the tenant for the staging instance
pub const STAGING_SUFFIX: &str = "-mkt-stage1";

/// Default API host
pub const DEFAULT_BASE_URI: &str = "https://mc.adobe.io";

/// Default assertion lifetime and fallback cache TTL, in seconds
pub const DEFAULT_EXPIRATION: u64 = 86_400;

fn default_true() -> bool {
    true
}

fn default_expiration() -> u64 {
    DEFAULT_EXPIRATION
}

fn default_base_uri() -> String {
    DEFAULT_BASE_URI.to_string()
}

/// Client configuration
///
/// Use [`ClientConfig::from_toml_str`], [`ClientConfig::from_file`] or
/// [`ClientConfig::from_value`]; each applies the staging suffix to the tenant.
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    /// Private key file path, or inline PEM
    pub private_key: String,
    /// API key (client id)
    pub api_key: String,
    /// Technical account id, the assertion subject
    pub tech_acct: String,
    /// Organization id, the assertion issuer
    pub organization: String,
    pub client_secret: SecretString,
    /// Customer instance name
    pub tenant: String,
    /// Access endpoint identifier, used as a claim name
    pub access_endpoint: String,
    /// Token exchange URL
    pub exchange_endpoint: String,
    pub audience: String,
    /// Organizational unit of the caller
    pub org_unit: String,

    /// Assertion lifetime in seconds
    #[serde(default = "default_expiration")]
    pub expiration: u64,
    /// Enable the persistent cache
    #[serde(default = "default_true")]
    pub cache: bool,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Target the staging instance
    #[serde(default = "default_true")]
    pub staging: bool,
    #[serde(default)]
    pub debug: bool,
    /// Enable flat-file request accounting
    #[serde(default)]
    pub log: bool,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Daily mutating request threshold; half of it is actually sent
    #[serde(default)]
    pub daily_threshold: Option<u64>,
    /// Query parameter carrying the org unit on mutating calls
    #[serde(default)]
    pub org_unit_param: Option<String>,
    /// Custom resources owned by the org unit
    #[serde(default)]
    pub org_unit_resources: Vec<String>,
    #[serde(default = "default_base_uri")]
    pub base_uri: String,
}

impl ClientConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, CampaignError> {
        let config: ClientConfig = toml::from_str(content)
            .map_err(|e| CampaignError::Config(format!("Invalid configuration: {}", e)))?;
        config.finish()
    }

    /// Read and parse a TOML file
    ///
    /// A relative `private_key` path is resolved against the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CampaignError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CampaignError::Config(format!("Failed to read configuration {:?}: {}", path, e))
        })?;

        let mut config = Self::from_toml_str(&content)?;
        if !config.private_key.contains("-----BEGIN") && Path::new(&config.private_key).is_relative() {
            if let Some(dir) = path.parent() {
                config.private_key = dir.join(&config.private_key).to_string_lossy().into_owned();
            }
        }
        Ok(config)
    }

    /// Build from a JSON object
    pub fn from_value(value: serde_json::Value) -> Result<Self, CampaignError> {
        let config: ClientConfig = serde_json::from_value(value)
            .map_err(|e| CampaignError::Config(format!("Invalid configuration: {}", e)))?;
        config.finish()
    }

    fn finish(mut self) -> Result<Self, CampaignError> {
        let required = [
            ("private_key", &self.private_key),
            ("api_key", &self.api_key),
            ("tech_acct", &self.tech_acct),
            ("organization", &self.organization),
            ("tenant", &self.tenant),
            ("access_endpoint", &self.access_endpoint),
            ("exchange_endpoint", &self.exchange_endpoint),
            ("audience", &self.audience),
            ("org_unit", &self.org_unit),
        ];
        if let Some((name, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(CampaignError::Config(format!("Missing required parameter: {}", name)));
        }
        if self.client_secret.expose_secret().is_empty() {
            return Err(CampaignError::Config(
                "Missing required parameter: client_secret".to_string(),
            ));
        }

        if self.staging && !self.tenant.ends_with(STAGING_SUFFIX) {
            self.tenant.push_str(STAGING_SUFFIX);
        }

        tracing::debug!(
            "Loaded configuration: tenant={}, staging={}, cache={}, debug={}",
            self.tenant,
            self.staging,
            self.cache,
            self.debug
        );

        Ok(self)
    }

    pub fn client_secret(&self) -> &str {
        self.client_secret.expose_secret()
    }

    /// Daily mutating-call allowance, half the configured threshold
    pub fn daily_allowance(&self) -> Option<u64> {
        self.daily_threshold.map(|threshold| threshold / 2)
    }
}
