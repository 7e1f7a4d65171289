//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::RoleSyncSettings;

pub(crate) fn home_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".rolesync")
}

/// Resolve the path to the settings file (`~/.rolesync/settings.json`).
pub fn settings_path() -> PathBuf {
    home_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RoleSyncSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RoleSyncSettings> {
    let defaults = serde_json::to_value(RoleSyncSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RoleSyncSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Reject values that would stall the engine.
pub fn validate(settings: &RoleSyncSettings) -> Result<()> {
    if settings.engine.fetch_concurrency == 0 {
        return Err(SettingsError::InvalidValue {
            key: "engine.fetch_concurrency",
            detail: "must be at least 1".into(),
        });
    }
    if settings.engine.sweep_interval_secs == 0 {
        return Err(SettingsError::InvalidValue {
            key: "engine.sweep_interval_secs",
            detail: "must be at least 1".into(),
        });
    }
    Ok(())
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

/// Apply `ROLESYNC_*` environment overrides. Invalid values are ignored
/// with a warning.
pub fn apply_env_overrides(settings: &mut RoleSyncSettings) {
    if let Some(v) = read_env_string("ROLESYNC_DB_PATH") {
        settings.database.path = PathBuf::from(v);
    }
    if let Some(v) = read_env_string("ROLESYNC_GAME_API_URL") {
        settings.game_api.base_url = v;
    }
    if let Some(v) = read_env_string("ROLESYNC_GAME_API_TOKEN") {
        settings.game_api.token = v;
    }
    if let Some(v) = read_env_string("ROLESYNC_DISCORD_API_URL") {
        settings.discord.base_url = v;
    }
    if let Some(v) = read_env_string("ROLESYNC_DISCORD_TOKEN") {
        settings.discord.token = v;
    }
    if let Some(v) = read_env_u64("ROLESYNC_FETCH_CONCURRENCY", 1, 100) {
        settings.engine.fetch_concurrency = v as usize;
    }
    if let Some(v) = read_env_u64("ROLESYNC_EDIT_DELAY_MS", 0, 60_000) {
        settings.engine.edit_delay_ms = v;
    }
    if let Some(v) = read_env_u64("ROLESYNC_SWEEP_INTERVAL_SECS", 5, 86_400) {
        settings.engine.sweep_interval_secs = v;
    }
    if let Some(v) = read_env_string("ROLESYNC_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("ROLESYNC_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid integer env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"engine": {"fetch_concurrency": 25, "edit_delay_ms": 250}});
        let source = serde_json::json!({"engine": {"edit_delay_ms": 0}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["engine"]["edit_delay_ms"], 0);
        assert_eq!(merged["engine"]["fetch_concurrency"], 25);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4, 5]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4, 5]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("absent.json")).unwrap();
        assert!(settings.engine.fetch_concurrency >= 1);
    }

    #[test]
    fn load_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"discord": {"base_url": "http://localhost:1"}}"#).unwrap();
        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.discord.base_url, "http://localhost:1");
        assert_eq!(settings.game_api.base_url, "https://api.clashofclans.com/v1");
    }

    #[test]
    fn load_invalid_json_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_settings_from_path(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"engine": {"sweep_interval_secs": 0}}"#).unwrap();
        let err = load_settings_from_path(&path).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::InvalidValue { key: "engine.sweep_interval_secs", .. }
        ));
    }

    #[test]
    fn zero_fetch_concurrency_is_rejected() {
        let mut settings = RoleSyncSettings::default();
        settings.engine.fetch_concurrency = 0;
        assert!(validate(&settings).is_err());
        assert!(validate(&RoleSyncSettings::default()).is_ok());
    }

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_range_bounds() {
        assert_eq!(parse_u64_range("25", 1, 100), Some(25));
        assert_eq!(parse_u64_range("0", 1, 100), None);
        assert_eq!(parse_u64_range("101", 1, 100), None);
        assert_eq!(parse_u64_range("x", 1, 100), None);
    }
}
