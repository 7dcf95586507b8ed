//! Storage failures surface once, verbatim, and stop the operation.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::sync::{Arc, atomic::Ordering};

use common::{Call, FaultyBackend, rec, user_adapter};
use keyrecord_adapter::{AdapterConfig, AdapterError, Criteria, MemorySchemaRegistry, RecordAdapter};
use keyrecord_storage::{StorageBackend, StorageError};
use serde_json::json;

fn by_id(id: &str) -> Criteria {
    Criteria::by_key("id", id)
}

#[tokio::test]
async fn find_propagates_get_error() {
    let backend = Arc::new(FaultyBackend::new());
    let adapter = user_adapter(Arc::clone(&backend));
    backend.fail_get.store(true, Ordering::SeqCst);

    let err = adapter.find("user", &by_id("u1")).await.unwrap_err();
    assert!(matches!(err, AdapterError::Storage(StorageError::Connection { .. })), "got {err:?}");
    assert_eq!(err.to_string(), "Connection error: injected failure");
}

#[tokio::test]
async fn create_stops_at_failed_write() {
    let backend = Arc::new(FaultyBackend::new());
    let adapter = user_adapter(Arc::clone(&backend));
    backend.fail_writes.store(true, Ordering::SeqCst);

    let err = adapter.create("user", rec(json!({"id": "u1"}))).await.unwrap_err();
    assert!(matches!(err, AdapterError::Storage(StorageError::Connection { .. })));
    assert!(
        !backend.calls().iter().any(|call| matches!(call, Call::Get(_))),
        "no read-back after a failed write"
    );
}

#[tokio::test]
async fn update_failure_leaves_record_untouched() {
    let backend = Arc::new(FaultyBackend::new());
    let adapter = user_adapter(Arc::clone(&backend));
    adapter.create("user", rec(json!({"id": "u1", "name": "Ann"}))).await.unwrap();
    backend.fail_writes.store(true, Ordering::SeqCst);

    let err =
        adapter.update("user", &by_id("u1"), rec(json!({"name": "Annie"}))).await.unwrap_err();
    assert!(matches!(err, AdapterError::Storage(StorageError::Connection { .. })));

    backend.fail_writes.store(false, Ordering::SeqCst);
    let found = adapter.find("user", &by_id("u1")).await.unwrap();
    assert_eq!(found, vec![rec(json!({"id": "u1", "name": "Ann"}))]);
}

#[tokio::test]
async fn update_stops_at_failed_expiry_lookup() {
    let backend = Arc::new(FaultyBackend::new());
    let adapter = user_adapter(Arc::clone(&backend));
    adapter.create("user", rec(json!({"id": "u1", "_ttl": 60}))).await.unwrap();
    backend.fail_get.store(true, Ordering::SeqCst);
    let calls_before = backend.calls().len();

    let err = adapter.update("user", &by_id("u1"), rec(json!({"name": "x"}))).await.unwrap_err();
    assert!(matches!(err, AdapterError::Storage(StorageError::Connection { .. })));
    assert_eq!(backend.calls()[calls_before..], [Call::Ttl("waterline:user:id:u1".to_owned())]);
}

#[tokio::test]
async fn destroy_propagates_delete_error() {
    let backend = Arc::new(FaultyBackend::new());
    let adapter = user_adapter(Arc::clone(&backend));
    adapter.create("user", rec(json!({"id": "u1"}))).await.unwrap();
    backend.fail_delete.store(true, Ordering::SeqCst);

    let err = adapter.destroy("user", &by_id("u1")).await.unwrap_err();
    assert!(matches!(err, AdapterError::Storage(StorageError::Connection { .. })));
    assert!(backend.inner().get(b"waterline:user:id:u1").await.unwrap().is_some());
}

#[tokio::test]
async fn drop_propagates_scan_error() {
    let backend = Arc::new(FaultyBackend::new());
    let adapter = user_adapter(Arc::clone(&backend));
    backend.fail_scan.store(true, Ordering::SeqCst);

    let err = adapter.drop("user", &[]).await.unwrap_err();
    assert!(matches!(err, AdapterError::Storage(StorageError::Connection { .. })));
    assert!(!backend.calls().iter().any(|call| matches!(call, Call::DeleteMany(_))));
}

/// With one batch in flight at a time, the failing batch is the last one
/// issued: the error is reported once and no further batches start.
#[tokio::test]
async fn drop_reports_first_batch_error_once() {
    let backend = Arc::new(FaultyBackend::failing_delete_many_after(2));
    let config = AdapterConfig::builder().drop_batch_size(2).max_concurrency(1).build().unwrap();
    let adapter = RecordAdapter::builder()
        .backend(Arc::clone(&backend))
        .registry(Arc::new(MemorySchemaRegistry::default()))
        .config(config)
        .build()
        .unwrap();
    adapter.define("user", common::user_schema());
    for i in 0..10 {
        adapter.create("user", rec(json!({"id": format!("u{i}")}))).await.unwrap();
    }

    let result = adapter.drop("user", &[]).await;
    assert!(matches!(result, Err(AdapterError::Storage(StorageError::Timeout))), "got {result:?}");

    let batches = backend.calls().iter().filter(|call| matches!(call, Call::DeleteMany(_))).count();
    assert_eq!(batches, 3);
    let remaining = backend.inner().keys_matching("waterline:user:*").await.unwrap();
    assert_eq!(remaining.len(), 6);
}

#[tokio::test]
async fn destroy_all_propagates_drop_error() {
    let backend = Arc::new(FaultyBackend::new());
    let adapter = user_adapter(Arc::clone(&backend));
    adapter.create("user", rec(json!({"id": "u1"}))).await.unwrap();
    backend.fail_delete.store(true, Ordering::SeqCst);

    let err = adapter.destroy("user", &Criteria::all()).await.unwrap_err();
    assert!(err.to_string().contains("injected failure"));
}
