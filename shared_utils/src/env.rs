use std::str::FromStr;

use crate::config::ConfigError;

/// Reads an environment variable, returning a structured error if it's missing.
///
/// This is a thin wrapper around `std::env::var` that provides a more
/// ergonomic and specific error type for missing variables.
///
/// # Arguments
/// * `name` - The name of the environment variable to read.
pub fn get_env_var(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

/// Reads and parses an optional environment variable.
///
/// Returns `Ok(None)` when the variable is unset or blank, and an
/// [`ConfigError::InvalidEnvVar`] when it is set but does not parse as `T`.
pub fn parse_env_var<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => return Ok(None),
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::InvalidEnvVar {
            name: name.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
}
