use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Environment variable naming the provider configuration file
pub const CONFIG_ENV: &str = "SKYID_PROVIDER_CONFIG";

/// Public description of a provider, handed to skapps by `getMetadata`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMetadata {
    pub name: String,
    pub url: String,

    pub relative_connector_path: String,
    pub connector_name: String,
    pub connector_w: u32,
    pub connector_h: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub metadata: ProviderMetadata,

    /// Local storage key holding the seed
    #[serde(default = "default_login_key")]
    pub login_key: String,
    /// Registry document discriminant, `metadata.url` when unset
    #[serde(default)]
    pub document_id: Option<String>,

    #[serde(default = "default_identity_ui_path")]
    pub identity_ui_path: String,
    #[serde(default = "default_permissions_ui_path")]
    pub permissions_ui_path: String,
    #[serde(default = "default_popup_size")]
    pub popup_width: u32,
    #[serde(default = "default_popup_size")]
    pub popup_height: u32,

    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
    #[serde(default)]
    pub popup_timeout_secs: Option<u64>,
    #[serde(default = "default_permission_fetch_retries")]
    pub permission_fetch_retries: u32,

    /// Origin trusted for handshake traffic
    #[serde(default = "default_host_origin")]
    pub host_origin: String,
}

fn default_login_key() -> String {
    "loginSeed".to_string()
}

fn default_identity_ui_path() -> String {
    "identity.html".to_string()
}

fn default_permissions_ui_path() -> String {
    "permissions.html".to_string()
}

fn default_popup_size() -> u32 {
    600
}

fn default_store_timeout_secs() -> u64 {
    10
}

fn default_permission_fetch_retries() -> u32 {
    1
}

fn default_host_origin() -> String {
    crate::messenger::ANY_ORIGIN.to_string()
}

impl ProviderConfig {
    pub fn new(metadata: ProviderMetadata) -> Self {
        Self {
            metadata,
            login_key: default_login_key(),
            document_id: None,
            identity_ui_path: default_identity_ui_path(),
            permissions_ui_path: default_permissions_ui_path(),
            popup_width: default_popup_size(),
            popup_height: default_popup_size(),
            store_timeout_secs: default_store_timeout_secs(),
            popup_timeout_secs: None,
            permission_fetch_retries: default_permission_fetch_retries(),
            host_origin: default_host_origin(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("invalid provider configuration")?;
        config.base_url()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read provider configuration at {}", path.display()))?;
        Self::from_json_str(&json)
    }

    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).with_context(|| format!("{CONFIG_ENV} is not set"))?;
        Self::from_file(path)
    }

    pub fn document_id(&self) -> &str {
        self.document_id.as_deref().unwrap_or(&self.metadata.url)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn popup_timeout(&self) -> Option<Duration> {
        self.popup_timeout_secs.map(Duration::from_secs)
    }

    /// Address popup paths are resolved against
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.metadata.url).with_context(|| format!("invalid provider url '{}'", self.metadata.url))
    }

    /// Origin popups post from
    pub fn provider_origin(&self) -> Result<String> {
        Ok(self.base_url()?.origin().ascii_serialization())
    }
}
