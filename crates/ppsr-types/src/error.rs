//! Configuration errors.

/// Errors raised while loading or validating [`crate::ServiceConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("invalid config file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("environment variable {var} is invalid: {reason}")]
    Env { var: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
