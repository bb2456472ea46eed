//! Configuration loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`GatewayConfig::default()`]
//! 2. If `$HOME/.llmux/config.json` (or `$USERPROFILE` on Windows) exists,
//!    deep-merge its contents over the defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules: objects merge recursively (source wins per-key);
//! arrays and primitives are replaced wholesale by source; `null` in source
//! is skipped, preserving whatever the target already had.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{ConfigError, Result};
use crate::types::GatewayConfig;

/// Resolve the path to the config file (`$HOME/.llmux/config.json`, falling
/// back to `$USERPROFILE` when `HOME` isn't set).
#[must_use]
pub fn config_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".llmux").join("config.json")
}

/// Load configuration from the default path with env var overrides.
pub fn load_config() -> Result<GatewayConfig> {
    load_config_from_path(&config_path())
}

/// Load configuration from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error rather than silently falling back.
pub fn load_config_from_path(path: &Path) -> Result<GatewayConfig> {
    let defaults = serde_json::to_value(GatewayConfig::default())
        .expect("GatewayConfig always serializes");

    let merged = if path.exists() {
        debug!(?path, "loading gateway config from file");
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "gateway config file not found, using defaults");
        defaults
    };

    let mut config: GatewayConfig =
        serde_json::from_value(merged).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Recursive deep merge of two JSON values: objects merge key-by-key
/// (source wins), everything else is replaced wholesale by source, and a
/// `null` in source is skipped so the target value survives.
#[must_use]
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

/// Apply environment variable overrides to loaded config. Invalid values are
/// logged and ignored rather than failing the load.
pub fn apply_env_overrides(config: &mut GatewayConfig) {
    if let Some(v) = read_env_u16("LLMUX_PORT", 1, 65535) {
        config.server.port = v;
    }
    if let Some(v) = read_env_string("LLMUX_HOSTNAME") {
        config.server.hostname = v;
    }
    if let Some(v) = read_env_bool("LLMUX_ROTATE_ON_429") {
        config.routing.rotate_on429 = v;
    }
    if let Some(v) = read_env_string("LLMUX_AMP_UPSTREAM_URL") {
        config.amp.upstream_url = Some(v);
    }
    if let Some(v) = read_env_u64("LLMUX_COOLDOWN_BASE_MS", 1, 600_000) {
        config.cooldown.base_delay_ms = v;
    }
    if let Some(v) = read_env_u64("LLMUX_COOLDOWN_MAX_MS", 1, 3_600_000) {
        config.cooldown.max_delay_ms = v;
    }
    if let Some(v) = read_env_u32("LLMUX_RETRY_MAX_ATTEMPTS", 1, 64) {
        config.retry.max_attempts = v;
    }
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

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let n: u16 = val.parse().ok()?;
    let result = (n >= min && n <= max).then_some(n);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let n: u64 = val.parse().ok()?;
    let result = (n >= min && n <= max).then_some(n);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let n: u32 = val.parse().ok()?;
    let result = (n >= min && n <= max).then_some(n);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}

/// Parse a string as a boolean. Accepts (case-insensitive):
/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
#[must_use]
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_nested_override_preserves_sibling_keys() {
        let target = json!({ "server": { "port": 8743, "hostname": "localhost" } });
        let source = json!({ "server": { "port": 9000 } });
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9000);
        assert_eq!(merged["server"]["hostname"], "localhost");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = json!({ "a": 1 });
        let source = json!({ "a": null });
        assert_eq!(deep_merge(target, source)["a"], 1);
    }

    #[test]
    fn merge_array_replaces_wholesale() {
        let target = json!({ "fallbackOrder": ["openai", "anthropic"] });
        let source = json!({ "fallbackOrder": ["gemini"] });
        assert_eq!(deep_merge(target, source)["fallbackOrder"], json!(["gemini"]));
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let config = load_config_from_path(Path::new("/nonexistent/config.json")).unwrap();
        assert_eq!(config.server.port, 8743);
    }

    #[test]
    fn load_partial_json_overrides_only_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"server": {"port": 9999}}"#).unwrap();

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.hostname, "localhost");
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            load_config_from_path(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn parse_bool_accepts_common_truthy_falsy_spellings() {
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("OFF"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
