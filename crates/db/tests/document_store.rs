//! Postgres store driver against a real database.
//!
//! Needs `DATABASE_URL`; run with `cargo test -p actionhost-db -- --ignored`.

use actionhost_core::store::{Store, StoreDriver, StoreError};
use actionhost_core::types::Document;
use actionhost_db::PgStoreDriver;
use assert_matches::assert_matches;
use serde_json::{json, Value};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn doc(value: Value) -> Document {
    value.as_object().cloned().expect("object")
}

fn open(pool: &PgPool, name: &str) -> std::sync::Arc<dyn Store> {
    PgStoreDriver::new(pool.clone())
        .create_store(name)
        .expect("store opens")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_bootstrap(pool: PgPool) {
    actionhost_db::health_check(&pool).await.unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_insert_assigns_id_and_finds(pool: PgPool) {
    let store = open(&pool, "mail_log");
    let stored = store.insert(doc(json!({"to": "a@b.com"}))).await.unwrap();
    assert!(stored["id"].is_string());

    let all = store.find(None).await.unwrap();
    assert_eq!(all, vec![stored.clone()]);

    let one = store.first(&doc(json!({"id": stored["id"]}))).await.unwrap();
    assert_eq!(one, Some(stored));
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_numeric_and_string_ids_are_distinct(pool: PgPool) {
    let store = open(&pool, "counters");
    store.insert(doc(json!({"id": 42, "n": 1}))).await.unwrap();
    store.insert(doc(json!({"id": "42", "n": 2}))).await.unwrap();

    assert_eq!(store.find(None).await.unwrap().len(), 2);
    let dup = store.insert(doc(json!({"id": 42}))).await;
    assert_matches!(dup, Err(StoreError::InvalidDocument(_)));
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_update_replaces_content_and_keeps_id(pool: PgPool) {
    let store = open(&pool, "mail_log");
    store
        .insert(doc(json!({"id": "m1", "to": "a", "sent": false})))
        .await
        .unwrap();

    let updated = store
        .update(&doc(json!({"id": "m1"})), doc(json!({"to": "b"})))
        .await
        .unwrap();
    assert_eq!(Value::Object(updated), json!({"id": "m1", "to": "b"}));

    let all = store.find(None).await.unwrap();
    assert_eq!(all.len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_update_missing_record(pool: PgPool) {
    let store = open(&pool, "mail_log");
    let result = store
        .update(&doc(json!({"id": "ghost"})), doc(json!({"to": "b"})))
        .await;
    assert_matches!(result, Err(StoreError::NotFound { .. }));
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_duplicate_id_rejected(pool: PgPool) {
    let store = open(&pool, "mail_log");
    store.insert(doc(json!({"id": "dup"}))).await.unwrap();
    let result = store.insert(doc(json!({"id": "dup"}))).await;
    assert_matches!(result, Err(StoreError::InvalidDocument(_)));
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_collections_are_isolated(pool: PgPool) {
    let mail = open(&pool, "mail_log");
    let audit = open(&pool, "audit");
    mail.insert(doc(json!({"kind": "mail"}))).await.unwrap();
    audit.insert(doc(json!({"kind": "audit"}))).await.unwrap();

    let filtered = mail.find(Some(&doc(json!({"kind": "audit"})))).await.unwrap();
    assert!(filtered.is_empty());
    assert_eq!(audit.find(None).await.unwrap().len(), 1);
}
