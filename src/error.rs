//! Custom error types for the review loop.
//!
//! Almost every external failure in this crate is converted into a named
//! fallback value at its call site. These errors exist so that the fallible
//! seams (git, the review service, the escalation store, configuration)
//! can report *what* went wrong before that conversion happens.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for review loop operations
#[derive(Error, Debug)]
pub enum ReviewLoopError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    // =========================================================================
    // External Collaborator Errors
    // =========================================================================
    /// Git operation failed
    #[error("Git operation failed: {operation} - {message}")]
    Git { operation: String, message: String },

    /// Git operation exceeded its time budget
    #[error("Git operation '{operation}' timed out after {}s", .timeout.as_secs())]
    GitTimeout {
        operation: String,
        timeout: Duration,
    },

    /// Review service request failed
    #[error("Review service request to {endpoint} failed: {message}")]
    Service { endpoint: String, message: String },

    // =========================================================================
    // Escalation History Errors
    // =========================================================================
    /// Escalation history could not be read or written
    #[error("Escalation history error at {path}: {message}")]
    History { path: PathBuf, message: String },

    // =========================================================================
    // Terminal Conditions
    // =========================================================================
    /// The poll loop stayed idle past its ceiling
    #[error("No review activity for {}s (ceiling: {}s)", .idle.as_secs(), .ceiling.as_secs())]
    IdleTimeout { idle: Duration, ceiling: Duration },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ReviewLoopError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a git error
    pub fn git(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Git {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a review service error
    pub fn service(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create an escalation history error
    pub fn history(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::History {
            path: path.into(),
            message: message.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } | Self::InvalidConfig { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for review loop results
pub type Result<T> = std::result::Result<T, ReviewLoopError>;
