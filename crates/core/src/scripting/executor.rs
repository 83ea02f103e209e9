//! Loader and executable seams plus their error types.
//!
//! A [`ScriptLoader`] turns the file at an action's script path into an
//! [`Executable`]. The registry loads every action once, in the background;
//! the dispatcher then runs the executable against a fresh
//! [`Domain`](crate::domain::Domain) per request.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::client::ClientError;
use crate::domain::Domain;
use crate::library::LibraryError;
use crate::store::StoreError;
use crate::types::Document;

/// Request context visible to an executable.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActionContext {
    /// Normalized action name.
    pub action: String,
    /// HTTP method of the inbound request.
    pub method: String,
    /// Request path, e.g. `/action/send-mail`.
    pub url: String,
    pub query: Document,
    pub body: Document,
    /// Whether the request carried the internal shared secret.
    pub internal: bool,
}

/// Failure to turn a script file into an executable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("Script not found: {0}")]
    NotFound(String),

    /// The script exists but was rejected by the loader (syntax check,
    /// unknown native action, ...).
    #[error("Script rejected: {0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Failure signalled by, or while running, an executable.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionFailure {
    /// The script reported an error itself.
    #[error("{0}")]
    Failed(String),

    #[error("Script timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Script exited with code {exit_code}: {stderr}")]
    Exited { exit_code: i32, stderr: String },

    /// The script broke the host protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Action panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An action body that can be invoked.
#[async_trait]
pub trait Executable: Send + Sync {
    /// Run once against `domain`. Returning `Ok` means the invocation
    /// succeeded and the domain's data view is the response.
    async fn run(
        &self,
        context: &ActionContext,
        domain: &mut Domain,
    ) -> Result<(), ExecutionFailure>;
}

/// Compiles or validates script files into executables.
#[async_trait]
pub trait ScriptLoader: Send + Sync {
    /// File extension (without the dot) of scripts this loader accepts.
    fn extension(&self) -> &str;

    /// Load the script at `path`.
    async fn load(&self, path: &Path) -> Result<Arc<dyn Executable>, LoadError>;
}
