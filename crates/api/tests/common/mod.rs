#![allow(dead_code)]

use std::sync::Arc;

use actionhost_api::config::ServerConfig;
use actionhost_api::router::build_app_router;
use actionhost_api::state::AppState;
use actionhost_core::action::ActionConfig;
use actionhost_core::domain::Domain;
use actionhost_core::scripting::{
    ActionContext, Executable, ExecutionFailure, NativeLoader, ScriptLoader,
};
use actionhost_core::store::MemoryStoreDriver;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

pub const TEST_SECRET: &str = "test-secret";

/// Build a test `ServerConfig` with safe defaults and a known internal secret.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::from_lookup(|_| None).expect("default config");
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.internal_secret = Some(TEST_SECRET.to_string());
    config
}

// ---------------------------------------------------------------------------
// Native actions
// ---------------------------------------------------------------------------

/// Requires `to`, stores the message and reports the stored id.
pub struct SendMail;

#[async_trait]
impl Executable for SendMail {
    async fn run(&self, _: &ActionContext, domain: &mut Domain) -> Result<(), ExecutionFailure> {
        let has_to = domain.data().get("to").is_some_and(Value::is_string);
        domain.error_unless(has_to, "to", Some(json!("required")));
        if domain.has_errors() {
            return Err(ExecutionFailure::Failed("Invalid mail request".into()));
        }
        let stored = domain.store(domain.data().clone()).await?;
        domain.set("id", stored["id"].clone());
        Ok(())
    }
}

/// Returns the merged view, minus `password`.
pub struct Echo;

#[async_trait]
impl Executable for Echo {
    async fn run(&self, ctx: &ActionContext, domain: &mut Domain) -> Result<(), ExecutionFailure> {
        domain.hide("password");
        domain.set("method", json!(ctx.method));
        Ok(())
    }
}

pub struct Panics;

#[async_trait]
impl Executable for Panics {
    async fn run(&self, _: &ActionContext, _: &mut Domain) -> Result<(), ExecutionFailure> {
        panic!("script blew up");
    }
}

/// Fetches everything stored by `send-mail`.
pub struct ListMail;

#[async_trait]
impl Executable for ListMail {
    async fn run(&self, _: &ActionContext, domain: &mut Domain) -> Result<(), ExecutionFailure> {
        let all = domain.fetch(Value::Null).await?;
        domain.set("items", all.into_value());
        Ok(())
    }
}

/// Calls the internal-only `audit` action through the internal client.
pub struct CallsAudit;

#[async_trait]
impl Executable for CallsAudit {
    async fn run(&self, _: &ActionContext, domain: &mut Domain) -> Result<(), ExecutionFailure> {
        let reply = domain.call("POST", "/action/audit", Some(json!({"event": "called"}))).await?;
        domain.set("audit", reply);
        Ok(())
    }
}

pub fn native_loader() -> NativeLoader {
    NativeLoader::new()
        .register("send-mail", Arc::new(SendMail))
        .register("list-mail", Arc::new(ListMail))
        .register("echo", Arc::new(Echo))
        .register("panics", Arc::new(Panics))
        .register("audit", Arc::new(Echo))
        .register("calls-audit", Arc::new(CallsAudit))
}

/// Action list shared by the integration tests. `broken` has no executable.
pub fn test_actions() -> Vec<ActionConfig> {
    vec![
        ActionConfig::named("Send Mail").with_resource("mail_log"),
        ActionConfig::named("List Mail").with_resource("mail_log"),
        ActionConfig::named("echo"),
        ActionConfig::named("panics"),
        ActionConfig::named("audit").internal(),
        ActionConfig::named("calls-audit"),
        ActionConfig::named("broken"),
    ]
}

// ---------------------------------------------------------------------------
// App builders
// ---------------------------------------------------------------------------

/// Build the full application router, as `main.rs` does, over native actions
/// and an in-memory store.
pub fn build_test_app() -> Router {
    build_app_with(test_config(), test_actions(), Arc::new(native_loader()))
}

pub fn build_app_with(
    config: ServerConfig,
    actions: Vec<ActionConfig>,
    loader: Arc<dyn ScriptLoader>,
) -> Router {
    let state = AppState::build(
        config.clone(),
        actions,
        loader,
        Arc::new(MemoryStoreDriver::new()),
    )
    .expect("app state");
    build_app_router(state, &config)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

/// Send one request through the router and return status plus JSON body.
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    internal: bool,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    if internal {
        builder = builder.header("x-internal-secret", TEST_SECRET);
    }
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, "POST", uri, Some(body), false).await
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, "GET", uri, None, false).await
}
