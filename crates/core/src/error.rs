use crate::scripting::executor::{ExecutionFailure, LoadError};
use crate::store::StoreError;

/// Errors produced by the action subsystem.
///
/// Every per-request failure ends up as one of these variants; the HTTP
/// layer maps them onto status codes.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("No action found for path {path}")]
    NotFound { path: String },

    #[error("Action '{action}' is only available to internal requests")]
    Forbidden { action: String },

    #[error("Failed to load action '{action}': {source}")]
    Load {
        action: String,
        #[source]
        source: LoadError,
    },

    #[error("Failed executing action '{action}': {source}")]
    Execution {
        action: String,
        #[source]
        source: ExecutionFailure,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
