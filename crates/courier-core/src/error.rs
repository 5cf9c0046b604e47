use thiserror::Error;

/// Core error type for the Courier callback pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Routing token does not resolve to a tenant
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    /// Execution not found
    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    /// Step execution not found
    #[error("Step execution not found: {0}")]
    StepNotFound(String),

    /// Form instance not found
    #[error("Form instance not found: {0}")]
    FormInstanceNotFound(String),

    /// Workflow definition not found
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Entity is not in a state that allows the requested transition
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Validator misconfiguration or failure to evaluate
    #[error("Validation error: {0}")]
    Validation(String),

    /// State store error
    #[error("State store error: {0}")]
    StateStore(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Media fetch, QR decode, outbound send or engine hand-off failed
    #[error("External dependency error: {0}")]
    ExternalDependency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// True for failures of a collaborator outside this core (media fetch,
    /// decode, send, engine). These are logged and apologised for, never retried here.
    pub fn is_downstream(&self) -> bool {
        matches!(self, CoreError::ExternalDependency(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}
