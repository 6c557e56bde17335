//! Error types for the CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// Catalog failed validation
    #[error("Catalog validation failed: {message}")]
    Validation {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON output error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Planner library error
    #[error("{0}")]
    Precursor(#[from] precursor::PrecursorError),
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a validation error
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use precursor::PrecursorError;

    #[test]
    fn test_config_error() {
        let err = CliError::config("no catalog");
        assert!(err.to_string().contains("Configuration"));
        assert!(err.to_string().contains("no catalog"));
    }

    #[test]
    fn test_invalid_argument_error() {
        let err = CliError::invalid_argument("bad status");
        assert!(err.to_string().contains("Invalid argument"));
    }

    #[test]
    fn test_validation_error() {
        let err = CliError::validation("2 error(s)");
        assert!(err.to_string().contains("2 error(s)"));
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cli_err: CliError = io_err.into();
        assert!(cli_err.to_string().contains("I/O"));
    }

    #[test]
    fn test_library_error_passes_through() {
        let err: CliError = PrecursorError::not_found("Missing").into();
        assert!(matches!(err, CliError::Precursor(_)));
        assert!(err.to_string().contains("Missing"));
    }
}
