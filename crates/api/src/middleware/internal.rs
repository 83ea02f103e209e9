//! Shared-secret extractor marking requests as internal.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::state::AppState;

/// Header carrying the shared secret.
pub const INTERNAL_SECRET_HEADER: &str = "x-internal-secret";

/// Whether the request presented the configured internal secret.
///
/// Never rejects: a missing or wrong secret just yields `InternalRequest(false)`.
/// When no secret is configured, no request is internal.
///
/// ```ignore
/// async fn my_handler(InternalRequest(internal): InternalRequest) { .. }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalRequest(pub bool);

impl FromRequestParts<AppState> for InternalRequest {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.internal_secret.as_deref() else {
            return Ok(InternalRequest(false));
        };

        let presented = parts
            .headers
            .get(INTERNAL_SECRET_HEADER)
            .and_then(|v| v.to_str().ok());

        Ok(InternalRequest(presented == Some(expected)))
    }
}
