//! Mode selection and runtime configuration.
//!
//! A `SyncConfig` is built once at startup (from the environment, a TOML
//! file, or both) and handed to every component by reference. The mode it
//! selects never changes for the lifetime of the process.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Placeholder values shipped in example env files.
const PLACEHOLDER_URL: &str = "your_supabase_url_here";
const PLACEHOLDER_KEY: &str = "your_supabase_anon_key_here";

/// Environment variables, primary name first.
const URL_VARS: &[&str] = &["WAREHOUSE_REMOTE_URL", "SUPABASE_URL"];
const KEY_VARS: &[&str] = &["WAREHOUSE_REMOTE_KEY", "SUPABASE_ANON_KEY"];
const OFFLINE_VAR: &str = "WAREHOUSE_OFFLINE";
const RELOAD_VAR: &str = "WAREHOUSE_RELOAD_AFTER_WRITE";

/// Which data path the process uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Local durable storage only.
    Offline,
    /// Remote store with realtime change notifications.
    Online,
}

/// Remote endpoint credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub url: String,
    pub anon_key: String,
}

impl RemoteConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
        }
    }

    /// Both values present and not the example placeholders.
    pub fn is_usable(&self) -> bool {
        let url = self.url.trim();
        let key = self.anon_key.trim();
        !url.is_empty() && !key.is_empty() && url != PLACEHOLDER_URL && key != PLACEHOLDER_KEY
    }
}

/// System-wide configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Force offline mode even when a remote is configured
    pub offline: bool,
    /// Reload a collection after each successful remote write instead of
    /// waiting for the realtime notification
    pub reload_after_write: bool,
    /// Prefix for realtime channel names
    pub channel_prefix: String,
    /// Remote endpoint; absent means offline
    pub remote: Option<RemoteConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            offline: false,
            reload_after_write: false,
            channel_prefix: "warehouse".to_string(),
            remote: None,
        }
    }
}

impl SyncConfig {
    /// Offline configuration with defaults
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Default::default()
        }
    }

    /// Online configuration for the given endpoint
    pub fn online(remote: RemoteConfig) -> Self {
        Self {
            remote: Some(remote),
            ..Default::default()
        }
    }

    pub fn is_remote_configured(&self) -> bool {
        self.remote.as_ref().is_some_and(RemoteConfig::is_usable)
    }

    pub fn is_offline(&self) -> bool {
        !self.is_remote_configured() || self.offline
    }

    pub fn mode(&self) -> Mode {
        if self.is_offline() {
            Mode::Offline
        } else {
            Mode::Online
        }
    }

    /// Build from process environment variables
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?.with_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply values from a variable lookup on top of `self`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first = |names: &[&str]| names.iter().find_map(|n| lookup(*n).filter(|v| !v.is_empty()));

        let url = first(URL_VARS);
        let key = first(KEY_VARS);
        if url.is_some() || key.is_some() {
            let mut remote = self.remote.take().unwrap_or_default();
            if let Some(url) = url {
                remote.url = url;
            }
            if let Some(key) = key {
                remote.anon_key = key;
            }
            self.remote = Some(remote);
        }
        if let Some(flag) = lookup(OFFLINE_VAR) {
            self.offline = parse_flag(&flag);
        }
        if let Some(flag) = lookup(RELOAD_VAR) {
            self.reload_after_write = parse_flag(&flag);
        }

        tracing::info!(
            has_url = self.remote.as_ref().is_some_and(|r| !r.url.is_empty()),
            has_key = self.remote.as_ref().is_some_and(|r| !r.anon_key.is_empty()),
            url_preview = %self.url_preview(),
            mode = ?self.mode(),
            "Remote configuration"
        );
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(remote) = self.remote.as_ref().filter(|r| r.is_usable()) {
            let url = remote.url.trim();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "remote url must be http(s): {}",
                    url
                )));
            }
        }
        if self.channel_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "channel_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// First 30 characters of the url, for logs.
    fn url_preview(&self) -> String {
        match &self.remote {
            Some(r) if !r.url.is_empty() => {
                let preview: String = r.url.chars().take(30).collect();
                format!("{}...", preview)
            }
            _ => "not set".to_string(),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}
