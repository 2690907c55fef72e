//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parsing or validation error
    #[error("Invalid configuration: {0}")]
    Config(#[from] contracts::ContractError),

    /// Operation needs a cargo feature this binary was built without
    #[error("This binary was built without the '{feature}' feature: {hint}")]
    MissingFeature { feature: &'static str, hint: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    #[cfg_attr(feature = "redis", allow(dead_code))]
    pub fn missing_feature(feature: &'static str, hint: impl Into<String>) -> Self {
        Self::MissingFeature {
            feature,
            hint: hint.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
