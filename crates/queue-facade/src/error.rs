//! Error types for the queue facade.
//!
//! Remote-side failures are not errors in this crate: they are normalized into
//! an [`OperationError`](crate::response::OperationError) and reported through
//! `false` / `None` results. The types here cover local faults only.

use std::time::Duration;
use thiserror::Error;

/// Local faults raised by the queue manager
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Queue directory has not been built yet")]
    DirectoryUnavailable,

    #[error("Malformed {operation} response: {message}")]
    MalformedResponse { operation: String, message: String },
}

impl QueueError {
    pub(crate) fn malformed(operation: &str, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// Check if error was raised while constructing the manager
    pub fn is_initialization_failure(&self) -> bool {
        matches!(self, Self::ConfigurationError(_))
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },
}

/// Failure of the transport collaborator to produce any response
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timed out after {duration:?}")]
    Timeout { duration: Duration },
}

impl TransportError {
    /// Error code recorded when the failure is normalized
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "ConnectionFailed",
            Self::Timeout { .. } => "RequestTimeout",
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
