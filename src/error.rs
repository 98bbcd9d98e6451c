use crate::mirror::NodeId;
use thiserror::Error;

/// Boxed error returned by event handlers.
pub type HandlerError = Box<dyn std::error::Error>;

pub type HandlerResult = Result<(), HandlerError>;

/// Failure reported by a host ingestion entry point.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<std::io::Error> for HostError {
    fn from(error: std::io::Error) -> Self {
        HostError(error.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    #[error("native module call {module}.{method} timed out after {timeout_ms}ms")]
    Timeout {
        module: String,
        method: String,
        timeout_ms: u64,
    },

    #[error("native module error: {0}")]
    Native(String),

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("node {0} is a comment and has no host counterpart")]
    CommentTarget(NodeId),

    #[error("invalid value for prop '{key}': {reason}")]
    InvalidProp { key: String, reason: String },
}
