//! Document store seam.
//!
//! Actions that name a `resource` get a [`Store`] handle opened through the
//! configured [`StoreDriver`]. The in-memory driver lives here; the Postgres
//! driver lives in `actionhost-db`.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::types::Document;

pub use memory::{MemoryStore, MemoryStoreDriver};

/// Errors raised by store drivers and the persistence façade.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The action has no bound store (`resource` was not configured).
    #[error("No store configured for action '{0}'")]
    NotConfigured(String),

    /// An update targeted a record that does not exist.
    #[error("Record not found in '{collection}': {id}")]
    NotFound { collection: String, id: String },

    /// The element or filter could not be stored as given.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// The backend failed (connection, serialization, constraint, ...).
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// A named collection of JSON documents.
///
/// Implementations must be safe for concurrent use: the same handle is
/// shared by every in-flight invocation of the owning action.
#[async_trait]
pub trait Store: Send + Sync {
    /// Collection name this handle is bound to.
    fn collection(&self) -> &str;

    /// Insert `element` as a new record, assigning an `id` when absent.
    /// Returns the stored record.
    async fn insert(&self, element: Document) -> Result<Document, StoreError>;

    /// Replace the first record matching `filter` with `element`.
    /// Returns the stored record.
    async fn update(&self, filter: &Document, element: Document) -> Result<Document, StoreError>;

    /// All records matching `filter`, or every record when `filter` is `None`.
    async fn find(&self, filter: Option<&Document>) -> Result<Vec<Document>, StoreError>;

    /// The first record matching `filter`.
    async fn first(&self, filter: &Document) -> Result<Option<Document>, StoreError>;
}

/// Opens (or creates) named stores.
pub trait StoreDriver: Send + Sync {
    /// Open the store called `name`, creating it if needed.
    fn create_store(&self, name: &str) -> Result<Arc<dyn Store>, StoreError>;

    /// Short label for health reporting (`"memory"`, `"postgres"`).
    fn kind(&self) -> &'static str;
}

/// Whether `doc` satisfies `filter`: every filter key must be present in
/// `doc` with an equal value.
pub fn matches(doc: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, expected)| doc.get(key) == Some(expected))
}
