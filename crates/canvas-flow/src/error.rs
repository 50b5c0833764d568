//! Error types for the canvas engine
//!
//! Most invalid editing input is not an error here: dangling references,
//! rejected connections and invalid media writes are logged and dropped.
//! Only execution failures and host-facing I/O surface as `Err`.

use thiserror::Error;

/// Result type alias using CanvasFlowError
pub type Result<T> = std::result::Result<T, CanvasFlowError>;

/// Errors that can occur in the canvas engine
#[derive(Debug, Error)]
pub enum CanvasFlowError {
    /// A node or flow executor failed
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// A run was requested while another run is in flight
    #[error("Another execution is already running")]
    Busy,

    /// Referenced node does not exist
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Referenced group does not exist
    #[error("Group not found: {0}")]
    GroupNotFound(String),

    /// Invalid configuration document
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CanvasFlowError {
    /// Create an execution failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }
}
