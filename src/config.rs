//! Configuration loading and persistence.
//!
//! Handles reading and writing the locsync configuration file, with
//! environment variable overrides for the values people change most.

// Rust guideline compliant 2026-01

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::constants::{
    DEFAULT_HUB_URL, DEFAULT_RECONNECT_DELAYS_MS, DEFAULT_USER_NAME, HANDSHAKE_TIMEOUT,
    LOCAL_SEND_DELAY,
};
use crate::sync::ReconnectPolicy;

/// Name of the configuration file inside the config directory.
const CONFIG_FILE: &str = "config.json";

/// Configuration for the locsync client.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Location hub endpoint (`http(s)://`).
    pub hub_url: String,
    /// Reconnect delays in milliseconds; the last one repeats.
    pub reconnect_delays_ms: Vec<u64>,
    /// Give up reconnecting after this many attempts. `None` retries forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_reconnect_attempts: Option<u32>,
    /// Simulated send latency in local fallback mode.
    pub local_send_delay_ms: u64,
    /// How long to wait for the hub handshake.
    pub handshake_timeout_ms: u64,
    /// Name published with this client's positions.
    pub user_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hub_url: DEFAULT_HUB_URL.to_string(),
            reconnect_delays_ms: DEFAULT_RECONNECT_DELAYS_MS.to_vec(),
            max_reconnect_attempts: None,
            local_send_delay_ms: u64::try_from(LOCAL_SEND_DELAY.as_millis()).unwrap_or(500),
            handshake_timeout_ms: u64::try_from(HANDSHAKE_TIMEOUT.as_millis()).unwrap_or(15_000),
            user_name: DEFAULT_USER_NAME.to_string(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `LOCSYNC_CONFIG_DIR` env var: explicit override
    /// 2. Default: platform config dir (e.g. `~/.config/locsync`)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("LOCSYNC_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("locsync")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Path of the configuration file.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing or unreadable file falls back to defaults.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Using default config: {:#}", e);
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load a configuration file without env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(hub_url) = std::env::var("LOCSYNC_HUB_URL") {
            self.hub_url = hub_url;
        }

        if let Ok(user_name) = std::env::var("LOCSYNC_USER_NAME") {
            if !user_name.trim().is_empty() {
                self.user_name = user_name;
            }
        }

        if let Ok(max) = std::env::var("LOCSYNC_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(max) = max.parse::<u32>() {
                self.max_reconnect_attempts = Some(max);
            }
        }
    }

    /// Persists the current configuration to the default location.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Persists the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        // Set restrictive permissions (owner read/write only)
        #[cfg(unix)]
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Reconnect schedule described by this configuration.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::from_millis(&self.reconnect_delays_ms, self.max_reconnect_attempts)
    }
}
