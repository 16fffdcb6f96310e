//! Sync service configuration
//!
//! Values come from defaults, then an optional JSON config file, then
//! `KINTREE_*` environment variables. Every field uses `#[serde(default)]`
//! so partial config files deserialize without error.

use crate::error::{FamilyError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use tokio::fs;

pub const ENV_PORT: &str = "KINTREE_PORT";
pub const ENV_BIND: &str = "KINTREE_BIND";
pub const ENV_DECLINE_POLICY: &str = "KINTREE_DECLINE_POLICY";
pub const ENV_UNDELIVERED_POLICY: &str = "KINTREE_UNDELIVERED_POLICY";

/// What a declined requester learns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclinePolicy {
    /// Requester is never told
    #[default]
    Silent,
    /// Requester receives `joinDeclined`
    Notify,
}

impl FromStr for DeclinePolicy {
    type Err = FamilyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silent" => Ok(Self::Silent),
            "notify" => Ok(Self::Notify),
            other => Err(FamilyError::protocol(format!(
                "unknown decline policy '{}' (expected silent or notify)",
                other
            ))),
        }
    }
}

/// What happens to a message whose recipient has no live session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UndeliveredPolicy {
    /// Message is discarded
    #[default]
    Drop,
    /// Sender receives `deliveryFailed` naming the recipient
    Report,
}

impl FromStr for UndeliveredPolicy {
    type Err = FamilyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "report" => Ok(Self::Report),
            other => Err(FamilyError::protocol(format!(
                "unknown undelivered policy '{}' (expected drop or report)",
                other
            ))),
        }
    }
}

/// Client-side session settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default)]
    pub decline_policy: DeclinePolicy,
}

/// Sync server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub undelivered_policy: UndeliveredPolicy,

    /// Used when the hub relays `declineJoin` notifications
    #[serde(default)]
    pub decline_policy: DeclinePolicy,

    /// Allowed browser origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            undelivered_policy: UndeliveredPolicy::default(),
            decline_policy: DeclinePolicy::default(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}

impl SyncConfig {
    /// Defaults overridden by `KINTREE_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Config file (defaults when it doesn't exist) overridden by the environment
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = load_config(path).await?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from any key lookup (the environment in production)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = lookup(ENV_PORT) {
            self.port = port
                .trim()
                .parse()
                .map_err(|e| FamilyError::protocol(format!("invalid {}: {}", ENV_PORT, e)))?;
        }
        if let Some(bind) = lookup(ENV_BIND) {
            self.bind_address = bind.trim().to_string();
        }
        if let Some(policy) = lookup(ENV_DECLINE_POLICY) {
            self.decline_policy = policy.parse()?;
        }
        if let Some(policy) = lookup(ENV_UNDELIVERED_POLICY) {
            self.undelivered_policy = policy.parse()?;
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| {
                FamilyError::protocol(format!(
                    "invalid bind address {}:{}: {}",
                    self.bind_address, self.port, e
                ))
            })
    }
}

/// Read a JSON config file, returning defaults if it doesn't exist
pub async fn load_config(path: impl AsRef<Path>) -> Result<SyncConfig> {
    let path = path.as_ref();
    if !fs::try_exists(path).await? {
        return Ok(SyncConfig::default());
    }

    let contents = fs::read_to_string(path)
        .await
        .map_err(|e| FamilyError::storage(format!("Failed to read config: {}", e)))?;

    serde_json::from_str(&contents)
        .map_err(|e| FamilyError::codec(format!("Failed to parse config: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();

        assert_eq!(config.port, 3001);
        assert_eq!(config.decline_policy, DeclinePolicy::Silent);
        assert_eq!(config.undelivered_policy, UndeliveredPolicy::Drop);
        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:3001");
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = SyncConfig::default();

        config
            .apply_overrides(lookup_from(&[
                (ENV_PORT, "8080"),
                (ENV_BIND, "0.0.0.0"),
                (ENV_DECLINE_POLICY, "Notify"),
                (ENV_UNDELIVERED_POLICY, "report"),
            ]))
            .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.decline_policy, DeclinePolicy::Notify);
        assert_eq!(config.undelivered_policy, UndeliveredPolicy::Report);
    }

    #[test]
    fn test_bad_overrides_are_rejected() {
        let mut config = SyncConfig::default();
        assert!(config
            .apply_overrides(lookup_from(&[(ENV_PORT, "not-a-port")]))
            .is_err());
        assert!(config
            .apply_overrides(lookup_from(&[(ENV_DECLINE_POLICY, "shout")]))
            .is_err());
    }

    #[test]
    fn test_missing_config_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();

        let config = tokio_test::block_on(load_config(temp_dir.path().join("kintree.json")))
            .unwrap();

        assert_eq!(config, SyncConfig::default());
    }

    #[tokio::test]
    async fn test_partial_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("kintree.json");
        std::fs::write(&path, r#"{"port": 4000, "declinePolicy": "notify"}"#).unwrap();

        let config = load_config(&path).await.unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.decline_policy, DeclinePolicy::Notify);
        assert_eq!(config.bind_address, "127.0.0.1");
    }
}
