//! Persistence façade.
//!
//! Translates domain-level `store` / `fetch` calls into operations on the
//! action's bound [`Store`]:
//!
//! | Call                      | Store operation               |
//! |---------------------------|-------------------------------|
//! | `persist` without `id`    | `insert(element)`             |
//! | `persist` with `id`       | `update({id}, element)`       |
//! | `fetch(All)`              | `find(None)`                  |
//! | `fetch(Filter(f))`        | `find(Some(f))`               |
//! | `fetch(Id(v))`            | `first({id: v})`              |

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::store::{Store, StoreError};
use crate::types::{identity, identity_filter, Document};

/// Shape of a fetch request.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchQuery {
    /// Every record in the store.
    All,
    /// Records matching a structured filter.
    Filter(Document),
    /// The single record with this identity.
    Id(Value),
}

impl From<Value> for FetchQuery {
    /// `null` → all, object → filter, anything else → identity.
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::All,
            Value::Object(filter) => Self::Filter(filter),
            other => Self::Id(other),
        }
    }
}

impl From<Option<Value>> for FetchQuery {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Self::All, Self::from)
    }
}

/// Result of a fetch: a list for `All` / `Filter`, one record for `Id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Fetched {
    Many(Vec<Document>),
    One(Option<Document>),
}

impl Fetched {
    /// Flatten into a JSON value (array, object or `null`).
    pub fn into_value(self) -> Value {
        match self {
            Self::Many(docs) => Value::Array(docs.into_iter().map(Value::Object).collect()),
            Self::One(doc) => doc.map_or(Value::Null, Value::Object),
        }
    }
}

/// Store access scoped to one action.
#[derive(Clone)]
pub struct Persistence {
    action: String,
    store: Option<Arc<dyn Store>>,
}

impl Persistence {
    pub fn new(action: impl Into<String>, store: Option<Arc<dyn Store>>) -> Self {
        Self {
            action: action.into(),
            store,
        }
    }

    /// Whether a store is bound.
    pub fn is_configured(&self) -> bool {
        self.store.is_some()
    }

    fn store(&self) -> Result<&Arc<dyn Store>, StoreError> {
        self.store
            .as_ref()
            .ok_or_else(|| StoreError::NotConfigured(self.action.clone()))
    }

    /// Insert `element`, or update the record sharing its identity.
    pub async fn persist(&self, element: Document) -> Result<Document, StoreError> {
        let store = self.store()?;
        match identity(&element) {
            Some(id) => {
                let filter = identity_filter(id.clone());
                store.update(&filter, element).await
            }
            None => store.insert(element).await,
        }
    }

    /// Fetch records according to the shape of `query`.
    pub async fn fetch(&self, query: FetchQuery) -> Result<Fetched, StoreError> {
        let store = self.store()?;
        match query {
            FetchQuery::All => store.find(None).await.map(Fetched::Many),
            FetchQuery::Filter(filter) => store.find(Some(&filter)).await.map(Fetched::Many),
            FetchQuery::Id(id) => store.first(&identity_filter(id)).await.map(Fetched::One),
        }
    }
}
