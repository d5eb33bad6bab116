use thiserror::Error;

/// Core error type for the apiflow engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// The flow graph is structurally invalid
    #[error("Flow validation error: {0}")]
    FlowValidationError(String),

    /// A referenced request definition could not be resolved
    #[error("Request not found: {0}")]
    RequestNotFound(String),

    /// A node's execution failed before producing any response
    #[error("Node execution error: {0}")]
    NodeExecutionError(String),

    /// Auth configuration could not be applied
    #[error("Auth error: {0}")]
    AuthError(String),

    /// Workspace storage error
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for FlowError {
    fn from(err: serde_json::Error) -> Self {
        FlowError::SerializationError(err.to_string())
    }
}

impl From<String> for FlowError {
    fn from(err: String) -> Self {
        FlowError::Other(err)
    }
}

impl From<&str> for FlowError {
    fn from(err: &str) -> Self {
        FlowError::Other(err.to_string())
    }
}
