//! HTTP implementation of the internal RPC client.
//!
//! Scripts call back into this server through it. Requests carry the
//! shared secret, so they are treated as internal by
//! [`InternalRequest`](crate::middleware::internal::InternalRequest).

use std::time::Duration;

use actionhost_core::client::{ClientError, InternalClient};
use async_trait::async_trait;
use serde_json::Value;

use crate::middleware::internal::INTERNAL_SECRET_HEADER;

/// Calls `<base_url><path>` with reqwest.
#[derive(Debug, Clone)]
pub struct HttpInternalClient {
    http: reqwest::Client,
    base_url: String,
    secret: Option<String>,
}

impl HttpInternalClient {
    pub fn new(
        base_url: impl Into<String>,
        secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl InternalClient for HttpInternalClient {
    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ClientError> {
        if !path.starts_with('/') {
            return Err(ClientError::InvalidRequest(format!(
                "Path must start with '/': {path}"
            )));
        }
        let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ClientError::InvalidRequest(format!("Unknown method '{method}'")))?;

        let mut request = self.http.request(method, format!("{}{path}", self.base_url));
        if let Some(secret) = &self.secret {
            request = request.header(INTERNAL_SECRET_HEADER, secret);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let payload: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        if !status.is_success() {
            let message = payload
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| status.to_string());
            return Err(ClientError::Status {
                status: status.as_u16(),
                message,
            });
        }

        // Unwrap the `{ "data": ... }` envelope when present.
        Ok(match payload {
            Value::Object(mut map) if map.contains_key("data") => {
                map.remove("data").unwrap_or(Value::Null)
            }
            other => other,
        })
    }
}
