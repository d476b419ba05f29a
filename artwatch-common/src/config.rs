//! Environment-backed configuration helpers
//!
//! Services resolve their settings from `ARTWATCH_*` environment variables at
//! startup. Required values fail startup with a configuration error; optional
//! values fall back to their defaults with a warning when present but
//! invalid, so a typo in a refresh interval never takes a running pipeline
//! down.

use crate::{Error, Result};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Prefix shared by every artwatch environment variable.
pub const ENV_PREFIX: &str = "ARTWATCH_";

/// Read `ARTWATCH_<name>`, treating empty or whitespace-only values as unset.
pub fn var(name: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{name}"))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

/// Read a required variable; missing values are fatal at startup.
pub fn required(name: &str) -> Result<String> {
    var(name).ok_or_else(|| Error::Config(format!("{ENV_PREFIX}{name} must be set")))
}

/// Read an optional variable with a default.
pub fn string_or(name: &str, default: &str) -> String {
    var(name).unwrap_or_else(|| default.to_string())
}

/// Read and parse an optional variable, falling back to `default` when the
/// value is absent or unparsable.
pub fn parse_or<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
{
    match var(name) {
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(
                    variable = %format!("{ENV_PREFIX}{name}"),
                    value = %raw,
                    default = %default,
                    "unparsable configuration value, using default"
                );
                default
            }
        },
        None => default,
    }
}

/// Read a whole-second duration with a default.
pub fn duration_secs_or(name: &str, default_secs: u64) -> Duration {
    Duration::from_secs(parse_or(name, default_secs))
}

/// Split a comma-separated list, dropping empty segments.
pub fn list_or(name: &str, default: &[&str]) -> Vec<String> {
    let raw = match var(name) {
        Some(raw) => raw,
        None => return default.iter().map(|s| s.to_string()).collect(),
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
