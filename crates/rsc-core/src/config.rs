//! Environment Configuration Loader
//!
//! Loads `KEY=VALUE` lines from the first environment file found:
//! `$RSC_ENV_FILE`, `/etc/rsc/environment`, then `.env`.
//! Existing process variables always win over file values.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Variable naming a custom environment file
pub const ENV_FILE_VAR: &str = "RSC_ENV_FILE";

/// Paths checked in order of priority
pub const ENV_FILE_PATHS: &[&str] = &["/etc/rsc/environment", ".env"];

/// Prefix of variables exposed to tool handlers through `CallContext`
pub const CONTEXT_ENV_PREFIX: &str = "RSC_";

/// Load the environment file. Returns the path that was loaded, if any.
pub fn load_environment() -> Option<String> {
    if let Ok(custom_path) = std::env::var(ENV_FILE_VAR) {
        if let Some(path) = try_load_env_file(&custom_path) {
            return Some(path);
        }
    }

    for path in ENV_FILE_PATHS {
        if let Some(loaded) = try_load_env_file(path) {
            return Some(loaded);
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

fn try_load_env_file(path: &str) -> Option<String> {
    if !Path::new(path).exists() {
        return None;
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read environment file {}: {}", path, e);
            return None;
        }
    };

    let mut loaded = 0;
    for (key, value) in content.lines().filter_map(parse_env_line) {
        if std::env::var(&key).is_err() {
            std::env::set_var(&key, &value);
            loaded += 1;
        }
    }

    info!(path = %path, loaded, "Loaded environment file");
    Some(path.to_string())
}

/// Parse `KEY=VALUE`, `KEY="VALUE"` or `KEY='VALUE'`; comments and blanks yield None.
pub fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (key, value) = line.split_once('=')?;
    let key = key.trim().trim_start_matches("export ").trim();
    if key.is_empty() {
        return None;
    }

    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

/// Snapshot of `RSC_*` variables with the prefix stripped
pub fn context_environment() -> HashMap<String, String> {
    std::env::vars()
        .filter_map(|(k, v)| {
            k.strip_prefix(CONTEXT_ENV_PREFIX)
                .map(|stripped| (stripped.to_string(), v))
        })
        .collect()
}

/// Get a configuration value with a default.
pub fn get_config(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a boolean configuration value.
pub fn get_config_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
        .unwrap_or(default)
}

/// Get an unsigned configuration value.
pub fn get_config_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_line_simple() {
        let (k, v) = parse_env_line("FOO=bar").unwrap();
        assert_eq!(k, "FOO");
        assert_eq!(v, "bar");
    }

    #[test]
    fn test_parse_env_line_quoted_and_exported() {
        assert_eq!(
            parse_env_line("export FOO=\"bar baz\""),
            Some(("FOO".to_string(), "bar baz".to_string()))
        );
        assert_eq!(
            parse_env_line("FOO='x=y'"),
            Some(("FOO".to_string(), "x=y".to_string()))
        );
    }

    #[test]
    fn test_parse_env_line_skips_noise() {
        assert!(parse_env_line("").is_none());
        assert!(parse_env_line("# comment").is_none());
        assert!(parse_env_line("=value").is_none());
        assert!(parse_env_line("novalue").is_none());
    }

    #[test]
    fn test_typed_lookups_fall_back() {
        assert_eq!(get_config_usize("RSC_TEST_SURELY_UNSET_USIZE", 7), 7);
        assert!(get_config_bool("RSC_TEST_SURELY_UNSET_BOOL", true));
        assert_eq!(get_config("RSC_TEST_SURELY_UNSET_STR", "self"), "self");
    }
}
