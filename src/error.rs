//! Error types for meshgraph

use thiserror::Error;

/// Stable error classification, used by the transport to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    ValidationFailed,
    StoreUnavailable,
    Cancelled,
    Unauthenticated,
    InvalidArgument,
}

/// The main error type for meshgraph operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Referenced node or edge is absent.
    #[error("not found: {0}")]
    NotFound(String),
    /// Traversal completed and the caller's level was insufficient.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Plugin descriptor rejected; carries the validator's reason.
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    /// Store transport or transaction failure, or a corrupted graph.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("request has no resolvable principal")]
    Unauthenticated,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl GraphError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::NotFound(_) => ErrorKind::NotFound,
            GraphError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            GraphError::ValidationFailed(_) => ErrorKind::ValidationFailed,
            GraphError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            GraphError::Cancelled => ErrorKind::Cancelled,
            GraphError::Unauthenticated => ErrorKind::Unauthenticated,
            GraphError::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }

    /// True when the error says nothing about the caller's rights, only that
    /// the decision could not be made.
    pub fn is_undeterminable(&self) -> bool {
        matches!(self, GraphError::StoreUnavailable(_) | GraphError::Cancelled)
    }
}

/// Result type alias for meshgraph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Convert any foreign error (heed, serde_json, io) to a store failure
pub fn err<E: std::error::Error>(e: E) -> GraphError {
    GraphError::StoreUnavailable(e.to_string())
}
