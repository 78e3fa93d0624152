//! Configuration loading for the command line front end.
//!
//! Settings come from a TOML file (`--config` or `TARIFA_CONFIG_PATH`),
//! falling back to built-in defaults, and are then overridden by
//! `TARIFA_*` environment variables.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tarifa_core::EngineConfig;
use tracing::{info, warn};

pub const CONFIG_PATH_VAR: &str = "TARIFA_CONFIG_PATH";

/// Resolve the configuration file, read it and apply environment overrides
pub fn load(explicit: Option<&Path>) -> Result<EngineConfig> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from));

    let config = match path {
        Some(path) if path.exists() => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {}", path.display()))?;
            info!(path = %path.display(), "Loaded configuration file");
            parse(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        Some(path) => {
            warn!(path = %path.display(), "Configuration file not found, using defaults");
            EngineConfig::default()
        }
        None => EngineConfig::default(),
    };

    Ok(apply_overrides(config, |name| std::env::var(name).ok()))
}

pub fn parse(text: &str) -> Result<EngineConfig> {
    Ok(toml::from_str(text)?)
}

/// Apply `TARIFA_*` overrides read through `lookup`. Unparseable values are ignored with a warning.
pub fn apply_overrides(mut config: EngineConfig, lookup: impl Fn(&str) -> Option<String>) -> EngineConfig {
    if let Some(ttl) = parsed(&lookup, "TARIFA_CACHE_TTL_SECONDS") {
        config.cache_ttl_seconds = ttl;
    }
    if let Some(capacity) = parsed(&lookup, "TARIFA_CACHE_MAX_CAPACITY") {
        config.cache_max_capacity = capacity;
    }
    if let Some(capacity) = parsed(&lookup, "TARIFA_AUDIT_CAPACITY") {
        config.audit_capacity = capacity;
    }
    if let Some(slow) = parsed(&lookup, "TARIFA_SLOW_CALCULATION_MS") {
        config.slow_calculation_ms = slow;
    }
    if let Some(method) = lookup("TARIFA_DEFAULT_METHOD") {
        config.default_method_code = method;
    }
    config
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring invalid environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_toml_file_with_partial_settings() {
        let config = parse(
            r#"
cache_ttl_seconds = 60
default_method_code = "KILOMETRO"
holidays = ["2024-12-25", "2025-01-01"]
"#,
        )
        .unwrap();

        assert_eq!(config.cache_ttl_seconds, 60);
        assert_eq!(config.default_method_code, "KILOMETRO");
        assert_eq!(config.holidays.len(), 2);
        assert_eq!(config.audit_capacity, EngineConfig::default().audit_capacity);
    }

    #[test]
    fn test_environment_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("TARIFA_CACHE_TTL_SECONDS", "30"),
            ("TARIFA_AUDIT_CAPACITY", "not-a-number"),
            ("TARIFA_DEFAULT_METHOD", "FIJO"),
        ]);

        let config = apply_overrides(EngineConfig::default(), |name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.cache_ttl_seconds, 30);
        assert_eq!(config.audit_capacity, 1000);
        assert_eq!(config.default_method_code, "FIJO");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = load(Some(Path::new("/nonexistent/tarifa.toml"))).unwrap();
        assert_eq!(config.slow_calculation_ms, EngineConfig::default().slow_calculation_ms);
    }
}
