//! Configuration utility functions
//!
//! Helpers for reading configuration values from environment variables
//! with a fallback default.

/// Get a string value from an environment variable or use the default
pub fn get_env_string(key: &str, default: String) -> String {
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val,
        _ => default,
    }
}

/// Get a boolean value from an environment variable or use the default
///
/// Accepts `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off` (case-insensitive).
/// Anything else falls back to the default.
pub fn get_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => parse_bool(&val).unwrap_or(default),
        Err(_) => default,
    }
}

/// Get an optional u64 value from an environment variable or use the default
pub fn get_env_u64(key: &str, default: Option<u64>) -> Option<u64> {
    match std::env::var(key) {
        Ok(val) => val.trim().parse().ok().or(default),
        Err(_) => default,
    }
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
