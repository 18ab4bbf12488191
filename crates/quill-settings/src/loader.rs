//! Settings loading with deep merge and environment variable overrides.
//!
//! 1. Start with compiled [`QuillSettings::default()`]
//! 2. If `~/.quill/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `QUILL_*` environment overrides (highest priority)
//! 4. Validate

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{quill_home, QuillSettings};

/// `~/.quill/settings.json`.
pub fn settings_path() -> PathBuf {
    quill_home().join("settings.json")
}

pub fn load_settings() -> Result<QuillSettings> {
    load_settings_from_path(&settings_path())
}

/// Missing file means defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<QuillSettings> {
    let defaults = serde_json::to_value(QuillSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: QuillSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key, arrays and primitives are replaced by `source`,
/// and nulls in `source` are skipped.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

pub fn validate(settings: &QuillSettings) -> Result<()> {
    if settings.store.quota_bytes == 0 {
        return Err(SettingsError::InvalidValue("store.quotaBytes must be positive".into()));
    }
    if settings.agent.max_iterations == 0 {
        return Err(SettingsError::InvalidValue("agent.maxIterations must be positive".into()));
    }
    if settings.persistence.enabled && settings.persistence.db_path.trim().is_empty() {
        return Err(SettingsError::InvalidValue(
            "persistence.dbPath is required when persistence is enabled".into(),
        ));
    }
    Ok(())
}

/// Apply `QUILL_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut QuillSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from any lookup. Values that fail to parse or fall out of
/// range are ignored with a warning.
pub fn apply_overrides(settings: &mut QuillSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = parsed(&read, "QUILL_QUOTA_BYTES", |v| parse_usize_range(v, 1, usize::MAX)) {
        settings.store.quota_bytes = v;
    }
    if let Some(v) = parsed(&read, "QUILL_MAX_ITERATIONS", |v| parse_u32_range(v, 1, 10_000)) {
        settings.agent.max_iterations = v;
    }
    if let Some(v) = parsed(&read, "QUILL_TURN_DELAY_MS", |v| parse_u64_range(v, 0, 600_000)) {
        settings.agent.turn_delay_ms = v;
    }
    if let Some(v) = read("QUILL_DB_PATH") {
        settings.persistence.db_path = v;
    }
    if let Some(v) = parsed(&read, "QUILL_PERSISTENCE", parse_bool) {
        settings.persistence.enabled = v;
    }
    if let Some(v) = read("QUILL_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = parsed(&read, "QUILL_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

fn parsed<T>(
    read: &impl Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = read(name)?;
    let value = parse(raw.trim());
    if value.is_none() {
        warn!(key = name, value = %raw, "invalid env override, ignoring");
    }
    value
}

/// Accepts (case-insensitive) `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}
