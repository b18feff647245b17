use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::loader::ConfigLoadError;

/// Read an environment variable, treating blank values as unset.
pub fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Parse an optional raw value, naming `key` in the error.
pub fn parse_value<T>(
    key: &'static str,
    raw: Option<&str>,
) -> Result<Option<T>, ConfigLoadError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.map(|raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|err| ConfigLoadError::invalid(key, raw, err))
    })
    .transpose()
}

/// Parse a human readable duration such as `15m`, `1h 30m` or `500ms`.
pub fn parse_duration(
    key: &'static str,
    raw: Option<&str>,
) -> Result<Option<Duration>, ConfigLoadError> {
    raw.map(|raw| {
        humantime::parse_duration(raw.trim())
            .map_err(|err| ConfigLoadError::invalid(key, raw, err))
    })
    .transpose()
}
