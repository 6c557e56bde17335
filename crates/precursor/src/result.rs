//! Result and error types for Precursor.

use thiserror::Error;

/// Result type for Precursor operations
pub type PrecursorResult<T> = Result<T, PrecursorError>;

/// Errors that can occur in Precursor.
///
/// Expected planning outcomes (not ready, blocked, circular dependency,
/// registry miss) are carried inside an `Analysis`, not raised from the chain
/// builder. `NotReady` and `Blocked` are only produced by the checking and
/// preflight entry points.
#[derive(Debug, Error)]
pub enum PrecursorError {
    /// No descriptor file or entry exists for the implication
    #[error("Implication descriptor not found: {id}")]
    DescriptorNotFound {
        /// Implication identifier
        id: String,
    },

    /// Descriptor could not be parsed
    #[error("Failed to parse implication descriptor {id}: {message}")]
    DescriptorParse {
        /// Implication identifier
        id: String,
        /// Parser message
        message: String,
    },

    /// Descriptor parsed but has an invalid shape
    #[error("Invalid implication descriptor {id}: {message}")]
    InvalidDescriptor {
        /// Implication identifier
        id: String,
        /// What is wrong with it
        message: String,
    },

    /// Snapshot document has an unusable shape
    #[error("Invalid snapshot: {message}")]
    InvalidSnapshot {
        /// Error message
        message: String,
    },

    /// Status is not known to the state registry
    #[error("Status '{status}' is not in the state registry")]
    UnknownStatus {
        /// Requested status
        status: String,
    },

    /// Preconditions are not met and nothing was executed
    #[error("Not ready for '{target}': current status is '{current}', {remaining} step(s) remaining")]
    NotReady {
        /// Target status
        target: String,
        /// Current status
        current: String,
        /// Incomplete steps
        remaining: usize,
    },

    /// The chain contains a step no known route can reach
    #[error("No path to '{status}': {reason}")]
    Blocked {
        /// Blocked status
        status: String,
        /// Blocking diagnostics
        reason: String,
    },

    /// A prerequisite step failed while executing
    #[error("Step '{status}' ({test_file}) failed: {message}")]
    StepFailed {
        /// Status the step should produce
        status: String,
        /// Test file that was executed
        test_file: String,
        /// Runner message
        message: String,
    },

    /// An executed step did not move the plan forward
    #[error("Executing '{status}' did not advance the plan")]
    NoProgress {
        /// Status of the step that was executed
        status: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PrecursorError {
    /// Create a descriptor-not-found error
    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::DescriptorNotFound { id: id.into() }
    }

    /// Create an invalid-descriptor error
    #[must_use]
    pub fn invalid_descriptor(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-snapshot error
    #[must_use]
    pub fn invalid_snapshot(message: impl Into<String>) -> Self {
        Self::InvalidSnapshot {
            message: message.into(),
        }
    }

    /// Whether this error means the descriptor simply does not exist
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::DescriptorNotFound { .. })
    }
}
