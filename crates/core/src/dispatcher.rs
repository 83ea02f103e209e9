//! Action dispatcher.
//!
//! Matches a request path against the registry and runs the action:
//!
//! 1. Match: the path must be `<prefix>` or start with `<prefix>/`,
//!    otherwise the request is [`Dispatch::Declined`] and belongs to the
//!    [`BaseResource`].
//! 2. Lookup: the rest of the path is the normalized action name.
//! 3. Merge: query parameters first, then body fields (body wins).
//! 4. Invoke: build a fresh [`Domain`] and run the executable on its own
//!    task. If the caller goes away, the task still finishes and its
//!    result is discarded.
//!
//! Each dispatched request yields exactly one outcome.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::client::InternalClient;
use crate::domain::Domain;
use crate::error::CoreError;
use crate::library::LibraryResolver;
use crate::persistence::Persistence;
use crate::registry::ActionRegistry;
use crate::scripting::executor::{ActionContext, ExecutionFailure};
use crate::types::Document;

/// Default route prefix handled by the dispatcher.
pub const DEFAULT_ROUTE_PREFIX: &str = "/action";

/// An inbound request, already decoded by the transport layer.
#[derive(Debug, Clone, Default)]
pub struct ActionRequest {
    pub method: String,
    pub path: String,
    pub query: Document,
    pub body: Document,
    /// Whether the request carried the internal shared secret.
    pub internal: bool,
}

/// Result of offering a request to the dispatcher.
#[derive(Debug)]
pub enum Dispatch {
    /// Not an action path; hand it to the base resource.
    Declined(ActionRequest),
    /// The action ran (or failed to); the request is finished.
    Completed(Result<Document, CoreError>),
}

/// Handles every request the dispatcher declines.
#[async_trait]
pub trait BaseResource: Send + Sync {
    async fn handle(&self, request: ActionRequest) -> Result<Value, CoreError>;
}

/// Base resource that knows no paths.
pub struct NotFoundResource;

#[async_trait]
impl BaseResource for NotFoundResource {
    async fn handle(&self, request: ActionRequest) -> Result<Value, CoreError> {
        Err(CoreError::NotFound { path: request.path })
    }
}

/// Routes action requests to registered actions.
pub struct ActionDispatcher {
    tag: Arc<str>,
    prefix: String,
    registry: Arc<ActionRegistry>,
    libraries: LibraryResolver,
    client: Option<Arc<dyn InternalClient>>,
}

impl ActionDispatcher {
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self {
            tag: Arc::clone(registry.tag()),
            prefix: DEFAULT_ROUTE_PREFIX.to_string(),
            registry,
            libraries: LibraryResolver::disabled(),
            client: None,
        }
    }

    /// Use `prefix` instead of `/action`. A trailing slash is ignored.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_libraries(mut self, libraries: LibraryResolver) -> Self {
        self.libraries = libraries;
        self
    }

    pub fn with_client(mut self, client: Arc<dyn InternalClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The requested action name if `path` is an action path.
    ///
    /// `/action` yields `Some("")` (which matches no action);
    /// `/actions` yields `None`.
    pub fn action_name<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() {
            return Some("");
        }
        rest.strip_prefix('/').map(|name| name.trim_end_matches('/'))
    }

    /// Handle `request` or decline it.
    pub async fn handle(&self, request: ActionRequest) -> Dispatch {
        tracing::info!(resource = %self.tag, path = %request.path, "Handling context");
        match self.action_name(&request.path) {
            Some(name) => {
                let name = name.to_string();
                Dispatch::Completed(self.invoke(&name, request).await)
            }
            None => Dispatch::Declined(request),
        }
    }

    async fn invoke(&self, name: &str, request: ActionRequest) -> Result<Document, CoreError> {
        // 1. Lookup.
        let Some(action) = self.registry.get(name) else {
            tracing::error!(resource = %self.tag, path = %request.path, "No action found for path");
            return Err(CoreError::NotFound { path: request.path });
        };

        if action.internal && !request.internal {
            tracing::warn!(resource = %self.tag, action = %name, "Rejected external call to internal action");
            return Err(CoreError::Forbidden {
                action: name.to_string(),
            });
        }

        // 2. Wait for the script (queues while the load is pending).
        let executable = action.executable().await.map_err(|source| {
            tracing::error!(resource = %self.tag, action = %name, error = %source, "Action not loaded");
            CoreError::Load {
                action: name.to_string(),
                source,
            }
        })?;

        // 3. Merge query, then body.
        let mut data = request.query.clone();
        data.extend(request.body.clone());

        // 4. Fresh domain for this invocation only.
        let domain = Domain::new(
            Arc::clone(&self.tag),
            name,
            data,
            Persistence::new(name, action.store()),
        )
        .with_libraries(self.libraries.clone())
        .with_client(self.client.clone());

        let context = ActionContext {
            action: name.to_string(),
            method: request.method,
            url: request.path,
            query: request.query,
            body: request.body,
            internal: request.internal,
        };

        // 5. Run detached from the caller; a dropped request discards the result.
        let task = tokio::spawn(async move {
            let mut domain = domain;
            executable
                .run(&context, &mut domain)
                .await
                .map(|()| domain.into_data())
        });

        let failure = match task.await {
            Ok(Ok(data)) => {
                tracing::info!(resource = %self.tag, action = %name, "Successfully executed action");
                return Ok(data);
            }
            Ok(Err(failure)) => failure,
            Err(join_err) if join_err.is_panic() => {
                ExecutionFailure::Panicked(panic_message(join_err.into_panic()))
            }
            Err(join_err) => return Err(CoreError::Internal(join_err.to_string())),
        };

        tracing::error!(resource = %self.tag, action = %name, error = %failure, "Failed executing action");
        Err(CoreError::Execution {
            action: name.to_string(),
            source: failure,
        })
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::action::ActionConfig;
    use crate::registry::RegistrySettings;
    use crate::scripting::{Executable, NativeLoader};
    use crate::test_helpers::{doc, RecordingDriver, StoreCall};

    /// Counts invocations and echoes the view back.
    #[derive(Default)]
    struct Counting {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl Executable for Counting {
        async fn run(&self, _: &ActionContext, _: &mut Domain) -> Result<(), ExecutionFailure> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Stores the incoming payload, as the mail example does.
    struct SendMail;

    #[async_trait]
    impl Executable for SendMail {
        async fn run(&self, _: &ActionContext, domain: &mut Domain) -> Result<(), ExecutionFailure> {
            let to = domain.data().get("to").cloned().unwrap_or(Value::Null);
            domain.error_unless(to.is_string(), "to", Some(json!("required")));
            domain.store(doc(json!({ "to": to }))).await?;
            Ok(())
        }
    }

    struct HidesSecret;

    #[async_trait]
    impl Executable for HidesSecret {
        async fn run(&self, _: &ActionContext, domain: &mut Domain) -> Result<(), ExecutionFailure> {
            domain.hide("secret");
            domain.merge(doc(json!({"secret": "leak", "seen": true})));
            Ok(())
        }
    }

    struct Fails;

    #[async_trait]
    impl Executable for Fails {
        async fn run(&self, _: &ActionContext, domain: &mut Domain) -> Result<(), ExecutionFailure> {
            domain.set("partial", json!(true));
            Err(ExecutionFailure::Failed("smtp down".into()))
        }
    }

    struct Panics;

    #[async_trait]
    impl Executable for Panics {
        async fn run(&self, _: &ActionContext, _: &mut Domain) -> Result<(), ExecutionFailure> {
            panic!("malformed script");
        }
    }

    struct Fixture {
        dispatcher: ActionDispatcher,
        driver: Arc<RecordingDriver>,
        counting: Arc<Counting>,
    }

    fn fixture() -> Fixture {
        let counting = Arc::new(Counting::default());
        let loader = NativeLoader::new()
            .register("send-mail", Arc::new(SendMail))
            .register("count", counting.clone())
            .register("other", Arc::new(Counting::default()))
            .register("hide", Arc::new(HidesSecret))
            .register("fails", Arc::new(Fails))
            .register("panics", Arc::new(Panics))
            .register("secret-op", Arc::new(Counting::default()));
        let driver = RecordingDriver::new();
        let registry = ActionRegistry::new(
            RegistrySettings::new("action", "/srv/actions"),
            vec![
                ActionConfig::named("Send Mail").with_resource("mail_log"),
                ActionConfig::named("count"),
                ActionConfig::named("other"),
                ActionConfig::named("hide"),
                ActionConfig::named("fails"),
                ActionConfig::named("panics"),
                ActionConfig::named("Secret Op").internal(),
                ActionConfig::named("unloadable"),
            ],
            Arc::new(loader),
            driver.clone(),
        )
        .expect("registry");
        Fixture {
            dispatcher: ActionDispatcher::new(Arc::new(registry)),
            driver,
            counting,
        }
    }

    fn request(path: &str) -> ActionRequest {
        ActionRequest {
            method: "POST".into(),
            path: path.into(),
            ..Default::default()
        }
    }

    fn completed(dispatch: Dispatch) -> Result<Document, CoreError> {
        match dispatch {
            Dispatch::Completed(result) => result,
            Dispatch::Declined(req) => panic!("unexpectedly declined {}", req.path),
        }
    }

    #[test]
    fn action_name_matching() {
        let f = fixture_sync();
        assert_eq!(f.action_name("/action/send-mail"), Some("send-mail"));
        assert_eq!(f.action_name("/action/send-mail/"), Some("send-mail"));
        assert_eq!(f.action_name("/action"), Some(""));
        assert_eq!(f.action_name("/actions"), None);
        assert_eq!(f.action_name("/users/1"), None);
    }

    fn fixture_sync() -> ActionDispatcher {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        let _guard = rt.enter();
        fixture().dispatcher.with_prefix("/action/")
    }

    #[tokio::test]
    async fn non_action_path_is_declined() {
        let f = fixture();
        let dispatch = f.dispatcher.handle(request("/users/1")).await;
        assert_matches!(dispatch, Dispatch::Declined(req) if req.path == "/users/1");
        assert_eq!(f.counting.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn registered_action_runs_exactly_once() {
        let f = fixture();
        let result = completed(f.dispatcher.handle(request("/action/count")).await);
        assert!(result.is_ok());
        assert_eq!(f.counting.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_action_is_not_found_and_runs_nothing() {
        let f = fixture();
        let result = completed(f.dispatcher.handle(request("/action/unregistered")).await);
        assert_matches!(result, Err(CoreError::NotFound { path }) if path == "/action/unregistered");
        assert_eq!(f.counting.runs.load(Ordering::SeqCst), 0);
        assert_eq!(f.driver.total_calls(), 0);
    }

    #[tokio::test]
    async fn name_match_is_case_sensitive() {
        let f = fixture();
        let result = completed(f.dispatcher.handle(request("/action/Count")).await);
        assert_matches!(result, Err(CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn send_mail_end_to_end() {
        let f = fixture();
        let mut req = request("/action/send-mail");
        req.body = doc(json!({"to": "a@b.com"}));

        let data = completed(f.dispatcher.handle(req).await).expect("success");

        assert_eq!(Value::Object(data), json!({"to": "a@b.com"}));
        let store = f.driver.store("mail_log").expect("store opened");
        assert_eq!(store.calls(), vec![StoreCall::Insert]);
    }

    #[tokio::test]
    async fn body_overrides_query() {
        let f = fixture();
        let mut req = request("/action/count");
        req.query = doc(json!({"a": "query", "q": "only"}));
        req.body = doc(json!({"a": "body", "b": 1}));

        let data = completed(f.dispatcher.handle(req).await).expect("success");
        assert_eq!(
            Value::Object(data),
            json!({"a": "body", "q": "only", "b": 1})
        );
    }

    #[tokio::test]
    async fn hidden_fields_stay_out_of_the_response() {
        let f = fixture();
        let mut req = request("/action/hide");
        req.body = doc(json!({"secret": "s", "to": "x"}));

        let data = completed(f.dispatcher.handle(req).await).expect("success");
        assert_eq!(Value::Object(data), json!({"to": "x", "seen": true}));
    }

    #[tokio::test]
    async fn execution_error_returns_no_data() {
        let f = fixture();
        let result = completed(f.dispatcher.handle(request("/action/fails")).await);
        assert_matches!(
            result,
            Err(CoreError::Execution { action, source: ExecutionFailure::Failed(msg) })
                if action == "fails" && msg == "smtp down"
        );
    }

    #[tokio::test]
    async fn panic_becomes_execution_error() {
        let f = fixture();
        let result = completed(f.dispatcher.handle(request("/action/panics")).await);
        assert_matches!(
            result,
            Err(CoreError::Execution { source: ExecutionFailure::Panicked(msg), .. })
                if msg == "malformed script"
        );
        // The dispatcher keeps serving.
        assert!(completed(f.dispatcher.handle(request("/action/count")).await).is_ok());
    }

    #[tokio::test]
    async fn load_failure_reported_per_invocation() {
        let f = fixture();
        for _ in 0..2 {
            let result = completed(f.dispatcher.handle(request("/action/unloadable")).await);
            assert_matches!(result, Err(CoreError::Load { action, .. }) if action == "unloadable");
        }
    }

    #[tokio::test]
    async fn internal_action_requires_internal_request() {
        let f = fixture();
        let result = completed(f.dispatcher.handle(request("/action/secret-op")).await);
        assert_matches!(result, Err(CoreError::Forbidden { .. }));

        let mut req = request("/action/secret-op");
        req.internal = true;
        assert!(completed(f.dispatcher.handle(req).await).is_ok());
    }

    #[tokio::test]
    async fn concurrent_invocations_do_not_share_domains() {
        let f = Arc::new(fixture());
        let mut handles = Vec::new();
        for i in 0..16 {
            let f = Arc::clone(&f);
            handles.push(tokio::spawn(async move {
                let mut req = request("/action/hide");
                req.body = doc(json!({"secret": i, "n": i}));
                completed(f.dispatcher.handle(req).await).expect("success")
            }));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            let data = handle.await.unwrap();
            assert_eq!(data["n"], i);
            assert!(data.get("secret").is_none());
        }
    }

    #[tokio::test]
    async fn base_resource_fallback_reports_not_found() {
        let result = NotFoundResource.handle(request("/users/1")).await;
        assert_matches!(result, Err(CoreError::NotFound { path }) if path == "/users/1");
    }
}
