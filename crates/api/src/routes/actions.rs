use axum::routing::{any, get};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the action routes.
///
/// ```text
/// GET  /actions                  registered actions
/// ANY  <prefix>                  dispatcher (empty name, always 404)
/// ANY  <prefix>/{*name}          dispatcher
/// ```
///
/// `prefix` is `/<RESOURCE_NAME>`, `/action` by default.
pub fn router(prefix: &str) -> Router<AppState> {
    Router::new()
        .route("/actions", get(handlers::actions::list))
        .route(prefix, any(handlers::actions::dispatch))
        .route(&format!("{prefix}/{{*name}}"), any(handlers::actions::dispatch))
}
