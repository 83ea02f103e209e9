//! Internal RPC seam.
//!
//! Action scripts can call back into the host server's own API. The HTTP
//! implementation lives in `actionhost-api`; requests made through it are
//! marked internal, so they may reach internal-only actions.

use async_trait::async_trait;
use serde_json::Value;

/// Errors raised by an [`InternalClient`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("No internal client configured")]
    NotConfigured,

    #[error("Invalid internal request: {0}")]
    InvalidRequest(String),

    #[error("Internal request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Internal request transport error: {0}")]
    Transport(String),
}

/// Client for the host server's own API.
#[async_trait]
pub trait InternalClient: Send + Sync {
    /// Send `method path` with an optional JSON body and return the
    /// response's JSON payload.
    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ClientError>;
}
