//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with [`ServerConfig::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `WAVEGATE_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ServerConfig;

/// Errors that can occur when loading settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Failed to read the settings file from disk.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON in the settings file.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The merged settings are inconsistent.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Default settings file: `$HOME/.wavegate/settings.json`.
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".wavegate").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ServerConfig, SettingsError> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path` with env var overrides.
///
/// A missing file yields the defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ServerConfig, SettingsError> {
    load_with(path, |name| std::env::var(name).ok())
}

fn load_with(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ServerConfig, SettingsError> {
    let defaults = serde_json::to_value(ServerConfig::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ServerConfig = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, env);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target), Value::Object(source)) => {
            for (key, value) in source {
                if value.is_null() {
                    continue;
                }
                let merged = match target.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = target.insert(key, merged);
            }
            Value::Object(target)
        }
        (target, Value::Null) => target,
        (_, source) => source,
    }
}

fn apply_overrides(settings: &mut ServerConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(v) = env("WAVEGATE_HOST").filter(|v| !v.is_empty()) {
        settings.host = v;
    }
    if let Some(v) = read("WAVEGATE_PORT", &env, |v| parse_u16_range(v, 0, u16::MAX)) {
        settings.port = v;
    }
    if let Some(v) = read("WAVEGATE_HEARTBEAT_INTERVAL_SECS", &env, |v| {
        parse_u64_range(v, 1, 3600)
    }) {
        settings.heartbeat_interval_secs = v;
    }
    if let Some(v) = read("WAVEGATE_DESTROY_ON_HARD_RESET", &env, parse_bool) {
        settings.destroy_on_hard_reset = v;
    }
    if let Some(v) = read("WAVEGATE_SERVICE_DISCOVERY", &env, parse_bool) {
        settings.enable_service_discovery = v;
    }
}

fn read<T>(
    name: &str,
    env: &impl Fn(&str) -> Option<String>,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let val = env(name)?;
    let result = parse(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

fn validate(settings: &ServerConfig) -> Result<(), SettingsError> {
    if settings.min_schema_version > settings.max_schema_version {
        return Err(SettingsError::InvalidValue(format!(
            "minSchemaVersion {} exceeds maxSchemaVersion {}",
            settings.min_schema_version, settings.max_schema_version
        )));
    }
    if settings.heartbeat_interval_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "heartbeatIntervalSecs must be positive".into(),
        ));
    }
    if settings.send_queue_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "sendQueueCapacity must be positive".into(),
        ));
    }
    Ok(())
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
