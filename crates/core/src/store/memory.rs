//! In-process store driver.
//!
//! Used when no `DATABASE_URL` is configured and throughout the tests.
//! Records are kept in insertion order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{matches, Store, StoreDriver, StoreError};
use crate::types::{identity, Document, ID_FIELD};

/// A single in-memory collection.
pub struct MemoryStore {
    collection: String,
    records: RwLock<Vec<Document>>,
}

impl MemoryStore {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            records: RwLock::new(Vec::new()),
        }
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn insert(&self, mut element: Document) -> Result<Document, StoreError> {
        if identity(&element).is_none() {
            element.insert(
                ID_FIELD.to_string(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }
        let mut records = self.records.write().await;
        if let Some(id) = element.get(ID_FIELD) {
            if records.iter().any(|r| r.get(ID_FIELD) == Some(id)) {
                return Err(StoreError::InvalidDocument(format!(
                    "Duplicate id {id} in '{}'",
                    self.collection
                )));
            }
        }
        records.push(element.clone());
        Ok(element)
    }

    async fn update(&self, filter: &Document, element: Document) -> Result<Document, StoreError> {
        let mut records = self.records.write().await;
        let slot = records
            .iter_mut()
            .find(|r| matches(r, filter))
            .ok_or_else(|| StoreError::NotFound {
                collection: self.collection.clone(),
                id: Value::Object(filter.clone()).to_string(),
            })?;

        // The stored id survives a replacement that omits it.
        let mut replacement = element;
        if let (None, Some(id)) = (identity(&replacement), slot.get(ID_FIELD)) {
            replacement.insert(ID_FIELD.to_string(), id.clone());
        }
        *slot = replacement;
        Ok(slot.clone())
    }

    async fn find(&self, filter: Option<&Document>) -> Result<Vec<Document>, StoreError> {
        let records = self.records.read().await;
        Ok(match filter {
            Some(filter) => records
                .iter()
                .filter(|r| matches(r, filter))
                .cloned()
                .collect(),
            None => records.clone(),
        })
    }

    async fn first(&self, filter: &Document) -> Result<Option<Document>, StoreError> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| matches(r, filter)).cloned())
    }
}

/// Driver handing out [`MemoryStore`]s; the same name always yields the
/// same collection.
#[derive(Default)]
pub struct MemoryStoreDriver {
    stores: Mutex<HashMap<String, Arc<MemoryStore>>>,
}

impl MemoryStoreDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete handle to an already-opened collection.
    pub fn get(&self, name: &str) -> Option<Arc<MemoryStore>> {
        self.stores.lock().ok()?.get(name).cloned()
    }
}

impl StoreDriver for MemoryStoreDriver {
    fn create_store(&self, name: &str) -> Result<Arc<dyn Store>, StoreError> {
        let mut stores = self
            .stores
            .lock()
            .map_err(|_| StoreError::Backend("memory store registry poisoned".to_string()))?;
        let store = stores
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryStore::new(name)))
            .clone();
        Ok(store)
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
