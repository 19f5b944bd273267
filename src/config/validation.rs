//! Field checks and value parsing shared by the config sections.

use std::sync::OnceLock;
use std::time::Duration;

use regex::{Captures, Regex};
use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// A field holds a value the relay cannot run with.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }
}

/// Parse a human duration such as `5s`, `1m30s` or `250ms`.
///
/// Used for the `--interval` flag; bare numbers are rejected so `5` is never
/// silently read as seconds or milliseconds.
///
/// ```
/// use telemetry_relay::config::parse_duration;
///
/// assert_eq!(parse_duration("5s").unwrap().as_secs(), 5);
/// assert_eq!(parse_duration("1m30s").unwrap().as_secs(), 90);
/// assert!(parse_duration("5").is_err());
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration string is empty".to_string());
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

fn env_reference() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env reference pattern is valid")
    })
}

/// Substitute `${VAR}` and `${VAR:-default}` references from the process
/// environment.
///
/// An unset variable without a default becomes the empty string, which lets
/// the device id and client id fall through to their derived values.
pub fn expand_env_vars(input: &str) -> String {
    env_reference()
        .replace_all(input, |caps: &Captures| {
            let fallback = caps.get(2).map_or("", |m| m.as_str());
            std::env::var(&caps[1]).unwrap_or_else(|_| fallback.to_string())
        })
        .into_owned()
}

/// `value` must not be empty.
pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::invalid(format!("{field} must not be empty")));
    }
    Ok(())
}

/// `value` must be non-zero.
pub(crate) fn require_positive(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(format!("{field} must be positive")));
    }
    Ok(())
}

/// A bare broker host: no scheme, no path.
pub(crate) fn require_host(field: &str, value: &str) -> Result<(), ConfigError> {
    require_non_empty(field, value)?;
    if value.contains("://") || value.contains('/') || value.chars().any(char::is_whitespace) {
        return Err(ConfigError::invalid(format!(
            "{field} must be a host name, got '{value}'"
        )));
    }
    Ok(())
}

/// A topic we can publish to: no wildcards, no empty levels at the ends.
pub(crate) fn require_publish_topic(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty()
        || value.contains(['#', '+'])
        || value.starts_with('/')
        || value.ends_with('/')
    {
        return Err(ConfigError::invalid(format!(
            "{field} must be a concrete topic name, got '{value}'"
        )));
    }
    Ok(())
}
