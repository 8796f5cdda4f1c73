use thiserror::Error;

/// Errors related to application configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable required by the application is not set.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable is set but its value cannot be parsed.
    #[error("Invalid value for environment variable {name}: {value:?} ({reason})")]
    InvalidEnvVar {
        name: String,
        value: String,
        reason: String,
    },
}
