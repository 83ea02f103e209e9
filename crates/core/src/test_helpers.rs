//! Shared test doubles for the core crate.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::store::{MemoryStore, Store, StoreDriver, StoreError};
use crate::types::Document;

/// Unwrap a `json!` object literal into a [`Document`].
pub fn doc(value: Value) -> Document {
    value.as_object().cloned().expect("object literal")
}

/// One observed store operation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Insert,
    Update(Document),
    Find(Option<Document>),
    First(Document),
}

/// A [`MemoryStore`] that records every call made against it.
pub struct RecordingStore {
    inner: MemoryStore,
    calls: Mutex<Vec<StoreCall>>,
}

impl RecordingStore {
    pub fn new(collection: &str) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(collection),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

#[async_trait]
impl Store for RecordingStore {
    fn collection(&self) -> &str {
        self.inner.collection()
    }

    async fn insert(&self, element: Document) -> Result<Document, StoreError> {
        self.record(StoreCall::Insert);
        self.inner.insert(element).await
    }

    async fn update(&self, filter: &Document, element: Document) -> Result<Document, StoreError> {
        self.record(StoreCall::Update(filter.clone()));
        self.inner.update(filter, element).await
    }

    async fn find(&self, filter: Option<&Document>) -> Result<Vec<Document>, StoreError> {
        self.record(StoreCall::Find(filter.cloned()));
        self.inner.find(filter).await
    }

    async fn first(&self, filter: &Document) -> Result<Option<Document>, StoreError> {
        self.record(StoreCall::First(filter.clone()));
        self.inner.first(filter).await
    }
}

/// Driver handing out [`RecordingStore`]s, remembering every one it opened.
#[derive(Default)]
pub struct RecordingDriver {
    opened: Mutex<Vec<Arc<RecordingStore>>>,
}

impl RecordingDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn store(&self, name: &str) -> Option<Arc<RecordingStore>> {
        self.opened
            .lock()
            .expect("opened lock")
            .iter()
            .find(|s| s.collection() == name)
            .cloned()
    }

    /// Total number of store calls across every opened store.
    pub fn total_calls(&self) -> usize {
        self.opened
            .lock()
            .expect("opened lock")
            .iter()
            .map(|s| s.calls().len())
            .sum()
    }
}

impl StoreDriver for RecordingDriver {
    fn create_store(&self, name: &str) -> Result<Arc<dyn Store>, StoreError> {
        if let Some(existing) = self.store(name) {
            return Ok(existing);
        }
        let store = RecordingStore::new(name);
        self.opened.lock().expect("opened lock").push(store.clone());
        Ok(store)
    }

    fn kind(&self) -> &'static str {
        "recording"
    }
}
