//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the identity provider address, OAuth client id, the
//! session storage backend, and the last used username.
//!
//! Configuration is stored at `~/.config/jwtlogin/config.json`. Values
//! from the environment (`JWTLOGIN_*`) take precedence over the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config directory paths
pub const APP_NAME: &str = "jwtlogin";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Preferences file holding the persisted session
const PREFERENCES_FILE: &str = "preferences.json";

const DEFAULT_BASE_URL: &str = "https://idp.example.com";
const DEFAULT_CLIENT_ID: &str = "69bfdce9-2c9f-4a12-aa7b-4fe15e1228dc";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const ENV_BASE_URL: &str = "JWTLOGIN_BASE_URL";
const ENV_CLIENT_ID: &str = "JWTLOGIN_CLIENT_ID";

/// Where the session record is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub client_id: String,
    pub request_timeout_secs: u64,
    pub storage: StorageKind,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            storage: StorageKind::default(),
            last_username: None,
        }
    }
}

impl Config {
    /// Load from the default config path, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Overlay values from an environment lookup
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            self.base_url = base_url;
        }
        if let Some(client_id) = lookup(ENV_CLIENT_ID).filter(|v| !v.is_empty()) {
            self.client_id = client_id;
        }
    }

    fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME))
    }

    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Path of the preferences file used by the file storage backend
    pub fn preferences_path(&self) -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(PREFERENCES_FILE))
    }
}
