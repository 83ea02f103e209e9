//! Action registry.
//!
//! Built once from the resource configuration. Each action gets its store
//! handle opened synchronously and its script loaded in the background;
//! the load result is published once on a `watch` channel.
//!
//! Load failures are deferred: they are logged when they happen and every
//! later invocation of that action fails with the recorded [`LoadError`].
//! Other actions keep working.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;

use crate::action::{ActionConfig, NameNormalization};
use crate::error::CoreError;
use crate::scripting::executor::{Executable, LoadError, ScriptLoader};
use crate::store::{Store, StoreDriver};

/// Registry construction settings.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Name of the owning resource; used in the log tag.
    pub resource_name: String,
    /// Directory holding one script per action.
    pub script_dir: PathBuf,
    pub normalization: NameNormalization,
}

impl RegistrySettings {
    pub fn new(resource_name: impl Into<String>, script_dir: impl Into<PathBuf>) -> Self {
        Self {
            resource_name: resource_name.into(),
            script_dir: script_dir.into(),
            normalization: NameNormalization::default(),
        }
    }
}

/// Load progress of an action's script.
#[derive(Clone)]
pub enum LoadState {
    Pending,
    Ready(Arc<dyn Executable>),
    Failed(LoadError),
}

impl LoadState {
    /// Short label for listings and health output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready(_) => "ready",
            Self::Failed(_) => "failed",
        }
    }

    fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Debug for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
            other => f.write_str(other.label()),
        }
    }
}

/// A registered action.
pub struct Action {
    /// Normalized name (registry key).
    pub name: String,
    pub description: Option<String>,
    pub internal: bool,
    /// Bound store / collection name.
    pub resource: Option<String>,
    /// Path the script was loaded from.
    pub script_path: PathBuf,
    store: Option<Arc<dyn Store>>,
    state: watch::Receiver<LoadState>,
}

impl Action {
    pub fn store(&self) -> Option<Arc<dyn Store>> {
        self.store.clone()
    }

    /// Snapshot of the current load state.
    pub fn load_state(&self) -> LoadState {
        self.state.borrow().clone()
    }

    /// Wait for the load to settle and return the executable.
    ///
    /// Invocations arriving before the script has loaded queue here.
    pub async fn executable(&self) -> Result<Arc<dyn Executable>, LoadError> {
        let mut rx = self.state.clone();
        let settled = rx.wait_for(LoadState::is_settled).await;
        match settled.as_deref() {
            Ok(LoadState::Ready(exe)) => Ok(exe.clone()),
            Ok(LoadState::Failed(e)) => Err(e.clone()),
            Ok(LoadState::Pending) | Err(_) => Err(LoadError::Invalid(
                "load task ended without a result".to_string(),
            )),
        }
    }
}

/// The set of configured actions, keyed by normalized name.
pub struct ActionRegistry {
    tag: Arc<str>,
    actions: HashMap<String, Arc<Action>>,
}

impl ActionRegistry {
    /// Register every action in `configs`.
    ///
    /// Must be called from within a Tokio runtime: script loads are spawned
    /// onto it. Fails on invalid or duplicate names and on stores that
    /// cannot be opened; script load failures do not fail construction.
    pub fn new(
        settings: RegistrySettings,
        configs: Vec<ActionConfig>,
        loader: Arc<dyn ScriptLoader>,
        driver: Arc<dyn StoreDriver>,
    ) -> Result<Self, CoreError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CoreError::Internal(format!("Action registry needs a runtime: {e}")))?;
        let tag: Arc<str> = Arc::from(format!("action-resource::{}", settings.resource_name));
        let mut actions = HashMap::with_capacity(configs.len());

        for config in configs {
            config.check()?;
            let name = settings.normalization.apply(&config.name);
            if actions.contains_key(&name) {
                return Err(CoreError::Validation(format!(
                    "Duplicate action name '{name}' (from '{}')",
                    config.name
                )));
            }

            let store = match &config.resource {
                Some(resource) => Some(driver.create_store(resource)?),
                None => None,
            };

            let script_path = settings
                .script_dir
                .join(format!("{name}.{}", loader.extension()));
            let (tx, rx) = watch::channel(LoadState::Pending);

            let task_loader = Arc::clone(&loader);
            let task_path = script_path.clone();
            let task_tag = Arc::clone(&tag);
            let task_name = name.clone();
            runtime.spawn(async move {
                let state = match task_loader.load(&task_path).await {
                    Ok(exe) => {
                        tracing::debug!(resource = %task_tag, action = %task_name, "Action loaded");
                        LoadState::Ready(exe)
                    }
                    Err(e) => {
                        tracing::error!(
                            resource = %task_tag,
                            action = %task_name,
                            path = %task_path.display(),
                            error = %e,
                            "Failed to init executable for action",
                        );
                        LoadState::Failed(e)
                    }
                };
                let _ = tx.send(state);
            });

            actions.insert(
                name.clone(),
                Arc::new(Action {
                    name,
                    description: config.description,
                    internal: config.internal,
                    resource: config.resource,
                    script_path,
                    store,
                    state: rx,
                }),
            );
        }

        tracing::debug!(resource = %tag, count = actions.len(), "Initializing action collection... done");
        Ok(Self { tag, actions })
    }

    /// Log tag of the owning resource (`action-resource::<name>`).
    pub fn tag(&self) -> &Arc<str> {
        &self.tag
    }

    /// Look up an action by normalized name.
    pub fn get(&self, name: &str) -> Option<Arc<Action>> {
        self.actions.get(name).cloned()
    }

    /// All actions, sorted by name.
    pub fn actions(&self) -> Vec<Arc<Action>> {
        let mut all: Vec<_> = self.actions.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Wait for every script load to settle; returns the failures.
    pub async fn ready(&self) -> Vec<(String, LoadError)> {
        let actions = self.actions();
        let results = join_all(actions.iter().map(|a| a.executable())).await;
        actions
            .iter()
            .zip(results)
            .filter_map(|(action, result)| result.err().map(|e| (action.name.clone(), e)))
            .collect()
    }
}
