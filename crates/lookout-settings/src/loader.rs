//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`LookoutSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `LOOKOUT_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{LogFormat, LookoutSettings};

/// Bounds for millisecond durations taken from the environment.
const MIN_INTERVAL_MS: u64 = 100;
const MAX_INTERVAL_MS: u64 = 600_000;

/// Resolve the path to the settings file (`~/.lookout/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".lookout").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<LookoutSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<LookoutSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<LookoutSettings> {
    let defaults = serde_json::to_value(LookoutSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `LOOKOUT_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut LookoutSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and the file/default value is
/// kept.
pub fn apply_overrides_from<F>(settings: &mut LookoutSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read_string = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let read_u64 = |name: &str| {
        let val = lookup(name)?;
        let result = parse_u64_range(&val, MIN_INTERVAL_MS, MAX_INTERVAL_MS);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    };

    if let Some(v) = read_string("LOOKOUT_API_URL") {
        settings.api.base_url = v;
    }
    if let Some(v) = read_u64("LOOKOUT_REQUEST_TIMEOUT_MS") {
        settings.api.request_timeout_ms = v;
    }
    if let Some(v) = read_string("LOOKOUT_WS_URL") {
        settings.stream.url = v;
    }
    if let Some(v) = read_u64("LOOKOUT_POLL_INTERVAL_MS") {
        settings.poll.interval_ms = v;
    }
    if let Some(v) = read_string("LOOKOUT_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_string("LOOKOUT_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(format) => settings.logging.format = format,
            None => tracing::warn!(key = "LOOKOUT_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
}

/// Check cross-field constraints that serde cannot express.
pub fn validate(settings: &LookoutSettings) -> Result<()> {
    let api = settings.api.base_url.trim();
    if !(api.starts_with("http://") || api.starts_with("https://")) {
        return Err(SettingsError::InvalidValue(format!(
            "api.baseUrl must be an http(s) URL, got '{api}'"
        )));
    }
    let ws = settings.stream.url.trim();
    if !(ws.starts_with("ws://") || ws.starts_with("wss://")) {
        return Err(SettingsError::InvalidValue(format!(
            "stream.url must be a ws(s) URL, got '{ws}'"
        )));
    }
    if settings.poll.interval_ms == 0 {
        return Err(SettingsError::InvalidValue("poll.intervalMs must be positive".into()));
    }
    if settings.api.request_timeout_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "api.requestTimeoutMs must be positive".into(),
        ));
    }
    Ok(())
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "compact" | "text" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}
