//! Error types for the Courier server
//!
//! This module contains the error types used throughout the server.

use courier_core::CoreError;
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Unauthorized error
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Request state does not allow the operation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Provider API or other collaborator failed
    #[error("Upstream error: {0}")]
    UpstreamError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

impl From<CoreError> for ServerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::FormInstanceNotFound(id) => ServerError::NotFound(format!("Form instance {}", id)),
            CoreError::ExecutionNotFound(id) => ServerError::NotFound(format!("Execution {}", id)),
            CoreError::TenantNotFound(token) => ServerError::NotFound(format!("Tenant {}", token)),
            CoreError::WorkflowNotFound(id) => ServerError::NotFound(format!("Workflow {}", id)),
            CoreError::Validation(msg) => ServerError::ValidationError(msg),
            CoreError::InvalidState(msg) => ServerError::Conflict(msg),
            CoreError::Configuration(msg) => ServerError::ConfigurationError(msg),
            err if err.is_downstream() => ServerError::UpstreamError(err.to_string()),
            err => ServerError::InternalError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::ValidationError(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for ServerError {
    fn from(err: serde_yaml::Error) -> Self {
        ServerError::ConfigurationError(format!("YAML error: {}", err))
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::InternalError(format!("IO error: {}", err))
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        ServerError::InternalError(format!("Error: {}", err))
    }
}
