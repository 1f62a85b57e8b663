//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Unknown clock mode: {0}")]
    UnknownClockMode(String),

    #[error("Clock multiplier must be finite and positive")]
    InvalidMultiplier,

    #[error("Billing poll interval must be positive")]
    InvalidPollInterval,

    #[error("Webhook request timeout must be between 1 and 300 seconds")]
    InvalidRequestTimeout,

    #[error("Failure rate must be within [0.0, 1.0]")]
    InvalidFailureRate,
}
