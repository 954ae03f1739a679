//! `locsync config`: show, get and set configuration values.
//!
//! Keys are top-level field names of the config file (`hub_url`,
//! `user_name`, ...). Values given to `set` are parsed as JSON first and
//! fall back to a plain string.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::config::Config;

/// Print the effective configuration as pretty JSON.
pub fn show(config: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

/// Look up a single top-level value.
pub fn get(config: &Config, key: &str) -> Result<Value> {
    let value = serde_json::to_value(config)?;
    value
        .get(key)
        .cloned()
        .with_context(|| format!("Unknown config key '{}'", key))
}

/// Update one field in the file at `path`, returning the new configuration.
///
/// A missing file starts from defaults. The file is only written when the
/// result still deserializes into a valid [`Config`].
pub fn set(path: &Path, key: &str, raw_value: &str) -> Result<Config> {
    let current = if path.exists() {
        Config::load_from(path)?
    } else {
        Config::default()
    };

    // Optional fields are omitted when unset, so list keys from a fully populated value.
    let known = serde_json::to_value(Config {
        max_reconnect_attempts: Some(0),
        ..Config::default()
    })?;
    if known.get(key).is_none() {
        anyhow::bail!("Unknown config key '{}'", key);
    }

    let mut value = serde_json::to_value(&current)?;
    let fields = value.as_object_mut().context("Config is not an object")?;
    let parsed = serde_json::from_str(raw_value).unwrap_or_else(|_| Value::String(raw_value.to_string()));
    fields.insert(key.to_string(), parsed);

    let updated: Config =
        serde_json::from_value(value).with_context(|| format!("Invalid value for '{}': {}", key, raw_value))?;
    updated.save_to(path)?;
    Ok(updated)
}
