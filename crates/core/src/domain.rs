//! Per-invocation sandbox handed to an action's executable.
//!
//! A [`Domain`] is built fresh for every invocation and owns all of that
//! invocation's mutable state: the current data view, the error map, the
//! set of hidden keys. Nothing in it is shared with other invocations
//! except the store handle inside the [`Persistence`] façade.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::client::{ClientError, InternalClient};
use crate::library::{LibraryError, LibraryResolver};
use crate::persistence::{FetchQuery, Fetched, Persistence};
use crate::store::StoreError;
use crate::types::Document;

/// Isolated execution context for a single action invocation.
pub struct Domain {
    tag: Arc<str>,
    action: String,
    data: Document,
    errors: Document,
    has_errors: bool,
    hidden: HashSet<String>,
    persistence: Persistence,
    libraries: LibraryResolver,
    client: Option<Arc<dyn InternalClient>>,
}

impl Domain {
    /// Build a domain over `data` for `action`.
    ///
    /// `tag` identifies the owning resource in log output.
    pub fn new(
        tag: Arc<str>,
        action: impl Into<String>,
        data: Document,
        persistence: Persistence,
    ) -> Self {
        Self {
            tag,
            action: action.into(),
            data,
            errors: Document::new(),
            has_errors: false,
            hidden: HashSet::new(),
            persistence,
            libraries: LibraryResolver::disabled(),
            client: None,
        }
    }

    /// Attach the library resolver used by [`require`](Self::require).
    pub fn with_libraries(mut self, libraries: LibraryResolver) -> Self {
        self.libraries = libraries;
        self
    }

    /// Attach the internal RPC client.
    pub fn with_client(mut self, client: Option<Arc<dyn InternalClient>>) -> Self {
        self.client = client;
        self
    }

    /// Normalized name of the invoking action.
    pub fn action(&self) -> &str {
        &self.action
    }

    // -----------------------------------------------------------------------
    // Error reporting
    // -----------------------------------------------------------------------

    /// Record `value` (default `true`) under `key`.
    ///
    /// Re-recording a key overwrites its value; the error flag is never
    /// cleared once set.
    pub fn error(&mut self, key: impl Into<String>, value: Option<Value>) {
        let key = key.into();
        let value = match value {
            None | Some(Value::Null) => Value::Bool(true),
            Some(v) => v,
        };
        tracing::error!(
            resource = %self.tag,
            action = %self.action,
            key = %key,
            value = %value,
            "Action reported error",
        );
        self.errors.insert(key, value);
        self.has_errors = true;
    }

    /// Record an error when `condition` holds.
    pub fn error_if(&mut self, condition: bool, key: impl Into<String>, value: Option<Value>) {
        if condition {
            self.error(key, value);
        }
    }

    /// Record an error unless `condition` holds.
    pub fn error_unless(&mut self, condition: bool, key: impl Into<String>, value: Option<Value>) {
        self.error_if(!condition, key, value);
    }

    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    /// The recorded error map.
    pub fn errors(&self) -> &Document {
        &self.errors
    }

    // -----------------------------------------------------------------------
    // Data view
    // -----------------------------------------------------------------------

    /// Current data view.
    pub fn data(&self) -> &Document {
        &self.data
    }

    /// Alias of [`data`](Self::data) for scripts written against `this`.
    pub fn this(&self) -> &Document {
        &self.data
    }

    /// Direct mutable access to the data view. Writes made here are
    /// explicit and may re-add hidden keys.
    pub fn data_mut(&mut self) -> &mut Document {
        &mut self.data
    }

    /// Remove `property` from the data view and keep it out of later merges.
    pub fn hide(&mut self, property: &str) {
        self.data.remove(property);
        self.hidden.insert(property.to_string());
    }

    pub fn is_hidden(&self, property: &str) -> bool {
        self.hidden.contains(property)
    }

    /// Explicitly set `key`, lifting any earlier [`hide`](Self::hide).
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.hidden.remove(&key);
        self.data.insert(key, value);
    }

    /// Merge `incoming` into the view. Hidden keys are skipped.
    pub fn merge(&mut self, incoming: Document) {
        for (key, value) in incoming {
            if !self.hidden.contains(&key) {
                self.data.insert(key, value);
            }
        }
    }

    /// Consume the domain, yielding the final data view.
    pub fn into_data(self) -> Document {
        self.data
    }

    // -----------------------------------------------------------------------
    // Persistence and passthroughs
    // -----------------------------------------------------------------------

    /// Insert `element`, or update by identity when it carries an `id`.
    pub async fn store(&self, element: Document) -> Result<Document, StoreError> {
        tracing::debug!(resource = %self.tag, action = %self.action, "Persisting element");
        self.persistence.persist(element).await
    }

    /// Fetch all records, matching records, or one record by identity.
    pub async fn fetch(&self, query: impl Into<FetchQuery>) -> Result<Fetched, StoreError> {
        let query = query.into();
        tracing::debug!(resource = %self.tag, action = %self.action, ?query, "Fetching");
        self.persistence.fetch(query).await
    }

    /// Resolve an auxiliary library by name.
    pub fn require(&self, name: &str) -> Result<PathBuf, LibraryError> {
        self.libraries.resolve(name)
    }

    pub fn client(&self) -> Option<&Arc<dyn InternalClient>> {
        self.client.as_ref()
    }

    /// Call the host server's own API through the internal client.
    pub async fn call(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ClientError> {
        let client = self.client.as_ref().ok_or(ClientError::NotConfigured)?;
        tracing::debug!(resource = %self.tag, action = %self.action, method, path, "Internal call");
        client.request(method, path, body).await
    }
}
