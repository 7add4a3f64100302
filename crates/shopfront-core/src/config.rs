//! Application configuration management.
//!
//! This module handles loading and saving the client configuration, which
//! includes the API endpoint, where the session is persisted, and the last
//! email used to sign in.
//!
//! Configuration is stored at `~/.config/shopfront/config.json`. The endpoint
//! can be overridden with `SHOPFRONT_API_URL`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::{TransportConfig, DEFAULT_API_URL};
use crate::auth::{FileStore, KeyValueStore, KeyringStore, MemoryStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "shopfront";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the configured endpoint
pub const API_URL_ENV: &str = "SHOPFRONT_API_URL";

/// Where the session is persisted between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorage {
    /// Files under the user data directory
    #[default]
    File,
    /// OS keychain
    Keyring,
    /// Nothing persisted; every run starts logged out
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_url: Option<String>,
    pub last_email: Option<String>,
    #[serde(default)]
    pub token_storage: TokenStorage,
    pub request_timeout_secs: Option<u64>,
    pub refresh_timeout_secs: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the persisted session files
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME).join("session"))
    }

    /// Endpoint resolution order: environment, config file, local default.
    pub fn api_url(&self) -> String {
        std::env::var(API_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn transport(&self) -> TransportConfig {
        let mut transport = TransportConfig::with_endpoint(self.api_url());
        if let Some(secs) = self.request_timeout_secs {
            transport.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.refresh_timeout_secs {
            transport.refresh_timeout = Duration::from_secs(secs);
        }
        transport
    }

    /// Open the configured session storage backend for `endpoint`.
    pub fn open_storage(&self, endpoint: &str) -> Result<Arc<dyn KeyValueStore>> {
        Ok(match self.token_storage {
            TokenStorage::File => Arc::new(FileStore::new(self.data_dir()?)),
            TokenStorage::Keyring => Arc::new(KeyringStore::new(&keyring_service(endpoint))),
            TokenStorage::Memory => Arc::new(MemoryStore::new()),
        })
    }
}

/// Keychain namespace, so sessions for different servers never mix.
fn keyring_service(endpoint: &str) -> String {
    format!("{}:{}", APP_NAME, endpoint.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = serde_json::from_str(r#"{"api_url":"https://shop.example.com/graphql"}"#)
            .expect("Failed to parse config test JSON");
        assert_eq!(config.token_storage, TokenStorage::File);
        assert_eq!(config.last_email, None);
    }

    #[test]
    fn test_parse_keyring_storage() {
        let config: Config = serde_json::from_str(r#"{"token_storage":"keyring","refresh_timeout_secs":3}"#)
            .expect("Failed to parse config test JSON");
        assert_eq!(config.token_storage, TokenStorage::Keyring);
        assert_eq!(config.transport().refresh_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_keyring_service_is_per_endpoint() {
        assert_eq!(
            keyring_service("https://shop.example.com/graphql/"),
            "shopfront:https://shop.example.com/graphql"
        );
        assert_ne!(keyring_service(DEFAULT_API_URL), keyring_service("https://shop.example.com/graphql"));
    }

    #[test]
    fn test_memory_storage_starts_empty() {
        let config = Config {
            token_storage: TokenStorage::Memory,
            ..Config::default()
        };
        let storage = config.open_storage(DEFAULT_API_URL).unwrap();
        assert_eq!(storage.get("accessToken").unwrap(), None);
    }

    #[test]
    fn test_transport_uses_configured_timeouts() {
        let config = Config {
            request_timeout_secs: Some(5),
            ..Config::default()
        };
        let transport = config.transport();
        assert_eq!(transport.request_timeout, Duration::from_secs(5));
        assert_eq!(transport.refresh_timeout, Duration::from_secs(10));
    }
}
