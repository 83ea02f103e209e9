use std::sync::Arc;
use std::time::Duration;

use actionhost_core::action::ActionConfig;
use actionhost_core::dispatcher::{ActionDispatcher, BaseResource, NotFoundResource};
use actionhost_core::error::CoreError;
use actionhost_core::library::LibraryResolver;
use actionhost_core::registry::ActionRegistry;
use actionhost_core::scripting::ScriptLoader;
use actionhost_core::store::StoreDriver;

use crate::client::HttpInternalClient;
use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything heavy sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (internal secret, action settings).
    pub config: Arc<ServerConfig>,
    /// Routes `/<resource>/<name>` requests to actions.
    pub dispatcher: Arc<ActionDispatcher>,
    /// Receives every request the dispatcher declines.
    pub base: Arc<dyn BaseResource>,
    /// Label of the store driver (`memory`, `postgres`).
    pub store_kind: &'static str,
    /// Database pool, when running against Postgres.
    pub pool: Option<actionhost_db::DbPool>,
}

impl AppState {
    /// Register `actions` and wire up the dispatcher.
    ///
    /// Must be called inside a Tokio runtime (script loads are spawned).
    pub fn build(
        config: ServerConfig,
        actions: Vec<ActionConfig>,
        loader: Arc<dyn ScriptLoader>,
        driver: Arc<dyn StoreDriver>,
    ) -> Result<Self, CoreError> {
        let store_kind = driver.kind();
        let registry = ActionRegistry::new(
            config.actions.registry_settings(),
            actions,
            loader,
            driver,
        )?;

        let client = HttpInternalClient::new(
            config.internal_base_url.clone(),
            config.internal_secret.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
        .map_err(|e| CoreError::Internal(e.to_string()))?;

        let dispatcher = ActionDispatcher::new(Arc::new(registry))
            .with_prefix(config.actions.route_prefix())
            .with_libraries(LibraryResolver::new(config.actions.lib_dir.clone()))
            .with_client(Arc::new(client));

        Ok(Self {
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
            base: Arc::new(NotFoundResource),
            store_kind,
            pool: None,
        })
    }

    pub fn with_pool(mut self, pool: actionhost_db::DbPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Replace the fallback resource (defaults to [`NotFoundResource`]).
    pub fn with_base(mut self, base: Arc<dyn BaseResource>) -> Self {
        self.base = base;
        self
    }
}
