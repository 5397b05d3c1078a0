//! Error types for Cortan.

/// Top-level error type for the runtime.
///
/// Handler failures are deliberately absent: the bus absorbs them, so they
/// never reach a caller as an `Error`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for the runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Errors a subscribed handler can report back to the bus.
///
/// The bus logs these and counts them; they never reach the publisher or
/// sibling handlers.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Handler failed: {reason}")]
    Failed { reason: String },

    #[error("Handler rejected event: {reason}")]
    Rejected { reason: String },
}

impl HandlerError {
    /// Shorthand for `Failed { reason }`.
    pub fn failed(reason: impl Into<String>) -> Self {
        HandlerError::Failed {
            reason: reason.into(),
        }
    }

    /// Shorthand for `Rejected { reason }`.
    pub fn rejected(reason: impl Into<String>) -> Self {
        HandlerError::Rejected {
            reason: reason.into(),
        }
    }
}
