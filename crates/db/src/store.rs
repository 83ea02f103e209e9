//! JSONB-backed [`Store`] implementation.
//!
//! Filters are evaluated with JSONB containment (`body @> filter`), which
//! agrees with the in-memory driver for flat scalar filters.

use std::sync::Arc;

use actionhost_core::store::{Store, StoreDriver, StoreError};
use actionhost_core::types::{identity, Document, ID_FIELD};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;

use crate::DbPool;

/// Column list for `action_documents` reads.
const BODY_COLUMNS: &str = "seq, body";

/// One collection inside `action_documents`.
pub struct PgStore {
    pool: DbPool,
    collection: String,
}

impl PgStore {
    pub fn new(pool: DbPool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    fn backend_error(&self, err: sqlx::Error) -> StoreError {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::InvalidDocument(
                format!("Duplicate id in '{}'", self.collection),
            ),
            _ => {
                tracing::error!(collection = %self.collection, error = %err, "Store query failed");
                StoreError::Backend(err.to_string())
            }
        }
    }
}

/// JSON text of a document id for the `doc_id` column. Keeping the JSON
/// encoding keeps `42` and `"42"` distinct, as in the memory driver.
fn id_text(id: &Value) -> String {
    id.to_string()
}

#[async_trait]
impl Store for PgStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn insert(&self, mut element: Document) -> Result<Document, StoreError> {
        let doc_id = match identity(&element) {
            Some(id) => id_text(id),
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                element.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
        };

        sqlx::query("INSERT INTO action_documents (collection, doc_id, body) VALUES ($1, $2, $3)")
            .bind(&self.collection)
            .bind(&doc_id)
            .bind(Json(&element))
            .execute(&self.pool)
            .await
            .map_err(|e| self.backend_error(e))?;

        Ok(element)
    }

    async fn update(&self, filter: &Document, element: Document) -> Result<Document, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| self.backend_error(e))?;

        let query = format!(
            "SELECT {BODY_COLUMNS} FROM action_documents \
             WHERE collection = $1 AND body @> $2 \
             ORDER BY seq LIMIT 1 FOR UPDATE"
        );
        let row: Option<(i64, Json<Document>)> = sqlx::query_as(&query)
            .bind(&self.collection)
            .bind(Json(filter))
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| self.backend_error(e))?;

        let Some((seq, Json(current))) = row else {
            return Err(StoreError::NotFound {
                collection: self.collection.clone(),
                id: Value::Object(filter.clone()).to_string(),
            });
        };

        let mut replacement = element;
        if let (None, Some(id)) = (identity(&replacement), current.get(ID_FIELD)) {
            replacement.insert(ID_FIELD.to_string(), id.clone());
        }
        let doc_id = identity(&replacement).map(id_text).ok_or_else(|| {
            StoreError::InvalidDocument(format!("Record in '{}' has no id", self.collection))
        })?;

        sqlx::query(
            "UPDATE action_documents SET doc_id = $2, body = $3, updated_at = now() WHERE seq = $1",
        )
        .bind(seq)
        .bind(&doc_id)
        .bind(Json(&replacement))
        .execute(&mut *tx)
        .await
        .map_err(|e| self.backend_error(e))?;

        tx.commit().await.map_err(|e| self.backend_error(e))?;
        Ok(replacement)
    }

    async fn find(&self, filter: Option<&Document>) -> Result<Vec<Document>, StoreError> {
        let rows: Vec<(i64, Json<Document>)> = match filter {
            Some(filter) => {
                let query = format!(
                    "SELECT {BODY_COLUMNS} FROM action_documents \
                     WHERE collection = $1 AND body @> $2 ORDER BY seq"
                );
                sqlx::query_as(&query)
                    .bind(&self.collection)
                    .bind(Json(filter))
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let query = format!(
                    "SELECT {BODY_COLUMNS} FROM action_documents \
                     WHERE collection = $1 ORDER BY seq"
                );
                sqlx::query_as(&query)
                    .bind(&self.collection)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| self.backend_error(e))?;

        Ok(rows.into_iter().map(|(_, Json(body))| body).collect())
    }

    async fn first(&self, filter: &Document) -> Result<Option<Document>, StoreError> {
        let query = format!(
            "SELECT {BODY_COLUMNS} FROM action_documents \
             WHERE collection = $1 AND body @> $2 ORDER BY seq LIMIT 1"
        );
        let row: Option<(i64, Json<Document>)> = sqlx::query_as(&query)
            .bind(&self.collection)
            .bind(Json(filter))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| self.backend_error(e))?;

        Ok(row.map(|(_, Json(body))| body))
    }
}

/// Hands out [`PgStore`]s sharing one pool. Opening a store does no I/O.
#[derive(Clone)]
pub struct PgStoreDriver {
    pool: DbPool,
}

impl PgStoreDriver {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl StoreDriver for PgStoreDriver {
    fn create_store(&self, name: &str) -> Result<Arc<dyn Store>, StoreError> {
        if name.trim().is_empty() {
            return Err(StoreError::InvalidDocument(
                "Collection name must not be empty".into(),
            ));
        }
        Ok(Arc::new(PgStore::new(self.pool.clone(), name)))
    }

    fn kind(&self) -> &'static str {
        "postgres"
    }
}
