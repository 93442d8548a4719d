use crate::error::{Error, Result};
use crate::provider::BackendVariant;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variables that override file settings.
pub const ENV_API_TYPE: &str = "OPENAI_API_TYPE";
pub const ENV_API_HOST: &str = "OPENAI_API_HOST";
pub const ENV_DEPLOYMENT_ID: &str = "AZURE_DEPLOYMENT_ID";
pub const ENV_API_VERSION: &str = "OPENAI_API_VERSION";
pub const ENV_ORGANIZATION: &str = "OPENAI_ORGANIZATION";
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";

/// Process-wide relay settings. Built once at startup, read-only afterwards.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend variant: `openai` (Direct) or `azure` (Gateway).
    pub api_type: BackendVariant,
    /// Base endpoint, without the `/v1/...` or `/openai/...` path.
    pub api_host: String,
    /// Deployment name. Gateway only.
    pub deployment_id: Option<String>,
    /// Protocol version query parameter. Gateway only.
    pub api_version: String,
    /// Organization header value. Direct only.
    pub organization: Option<String>,
    /// Default credential when a request carries none.
    pub api_key: Option<String>,
    pub max_tokens: u32,
    /// Upper bound on a whole relay call, streaming included.
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_type: BackendVariant::Direct,
            api_host: "https://api.openai.com".to_string(),
            deployment_id: None,
            api_version: "2023-03-15-preview".to_string(),
            organization: None,
            api_key: None,
            max_tokens: 8000,
            timeout_secs: 600_000,
            connect_timeout_secs: 10,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_type", &self.api_type)
            .field("api_host", &self.api_host)
            .field("deployment_id", &self.deployment_id)
            .field("api_version", &self.api_version)
            .field("organization", &self.organization)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Default location of the config file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("chat-relay").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".chat-relay/config.toml"))
    }

    /// Load from the default path, then apply environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load from `path` (defaults if missing), then apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_from_with(path, |name| std::env::var(name).ok())
    }

    /// Like [`Config::load_from`], with overrides read through `lookup`.
    pub fn load_from_with<F>(path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Config::default()
        };

        config.apply_env(lookup)?;
        Ok(config)
    }

    /// Override settings from environment lookups. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(value) = get(ENV_API_TYPE) {
            self.api_type = BackendVariant::from_id(&value).ok_or_else(|| {
                Error::Config(format!("Unknown {ENV_API_TYPE} '{value}' (expected openai or azure)"))
            })?;
        }
        if let Some(value) = get(ENV_API_HOST) {
            self.api_host = value;
        }
        if let Some(value) = get(ENV_DEPLOYMENT_ID) {
            self.deployment_id = Some(value);
        }
        if let Some(value) = get(ENV_API_VERSION) {
            self.api_version = value;
        }
        if let Some(value) = get(ENV_ORGANIZATION) {
            self.organization = Some(value);
        }
        if let Some(value) = get(ENV_API_KEY) {
            self.api_key = Some(value);
        }
        Ok(())
    }
}
