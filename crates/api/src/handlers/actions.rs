//! Handlers for action invocation and listing.

use std::collections::HashMap;

use actionhost_core::dispatcher::{ActionRequest, Dispatch};
use actionhost_core::types::Document;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{Method, Uri};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::middleware::internal::InternalRequest;
use crate::response::DataResponse;
use crate::state::AppState;

/// One entry of `GET /actions`.
#[derive(Debug, Serialize)]
pub struct ActionSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub internal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// `pending`, `ready` or `failed`.
    pub state: &'static str,
}

/// Any method on the action prefix, and the router fallback.
///
/// Query parameters and the JSON object body are handed to the dispatcher;
/// paths it declines go to the base resource.
pub async fn dispatch(
    State(state): State<AppState>,
    InternalRequest(internal): InternalRequest,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> AppResult<Json<DataResponse<Value>>> {
    let request = ActionRequest {
        method: method.to_string(),
        path: decoded_path(&uri)?,
        query: query_document(&uri)?,
        body: body_document(&body)?,
        internal,
    };

    let data = match state.dispatcher.handle(request).await {
        Dispatch::Completed(result) => Value::Object(result?),
        Dispatch::Declined(request) => state.base.handle(request).await?,
    };
    Ok(Json(DataResponse { data }))
}

/// GET /actions
///
/// Internal-only actions are listed for internal callers only.
pub async fn list(
    State(state): State<AppState>,
    InternalRequest(internal): InternalRequest,
) -> Json<DataResponse<Vec<ActionSummary>>> {
    let data = state
        .dispatcher
        .registry()
        .actions()
        .into_iter()
        .filter(|action| internal || !action.internal)
        .map(|action| ActionSummary {
            name: action.name.clone(),
            description: action.description.clone(),
            internal: action.internal,
            resource: action.resource.clone(),
            state: action.load_state().label(),
        })
        .collect();
    Json(DataResponse { data })
}

/// Percent-decoded request path, so names that keep a space are reachable.
fn decoded_path(uri: &Uri) -> AppResult<String> {
    urlencoding::decode(uri.path())
        .map(|path| path.into_owned())
        .map_err(|_| AppError::BadRequest("Request path is not valid UTF-8".into()))
}

fn query_document(uri: &Uri) -> AppResult<Document> {
    let Query(params) = Query::<HashMap<String, String>>::try_from_uri(uri)
        .map_err(|e| AppError::BadRequest(format!("Invalid query string: {e}")))?;
    Ok(params
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect())
}

/// An empty body is an empty document; anything else must be a JSON object.
fn body_document(body: &[u8]) -> AppResult<Document> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Document::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::BadRequest(
            "Request body must be a JSON object".into(),
        )),
        Err(e) => Err(AppError::BadRequest(format!("Invalid JSON body: {e}"))),
    }
}
