//! Error types shared across Vigil crates.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, VigilError>;

#[derive(Debug, Error)]
pub enum VigilError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    #[error("Invalid timezone: '{0}'")]
    InvalidTimezone(String),

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl VigilError {
    /// Build an `InvalidSchedule` error.
    pub fn invalid_schedule(expression: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error was raised by input validation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidSchedule { .. } | Self::InvalidTimezone(_) | Self::InvalidJob(_)
        )
    }
}
