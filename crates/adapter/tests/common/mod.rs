//! Shared fixtures for adapter integration tests.

#![allow(dead_code, clippy::expect_used)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use keyrecord_adapter::{
    AttributeDefinition, AttributeType, CollectionSchema, MemorySchemaRegistry, Record,
    RecordAdapter,
};
use keyrecord_storage::{MemoryBackend, StorageBackend, StorageError, StorageResult};
use serde_json::Value;

/// Converts a `json!` object into a [`Record`].
pub fn rec(value: Value) -> Record {
    value.as_object().cloned().expect("test records are objects")
}

/// `user` collection: string `id` primary key, free-form `name`.
pub fn user_schema() -> CollectionSchema {
    [
        ("id", AttributeDefinition::new(AttributeType::String).primary_key()),
        ("name", AttributeDefinition::new(AttributeType::String)),
    ]
    .into_iter()
    .collect()
}

/// An adapter over `backend` with `user` defined.
pub fn user_adapter<B: StorageBackend + 'static>(
    backend: Arc<B>,
) -> RecordAdapter<B, MemorySchemaRegistry> {
    let adapter = RecordAdapter::builder()
        .backend(backend)
        .registry(Arc::new(MemorySchemaRegistry::default()))
        .build()
        .expect("default registry matches default config");
    adapter.define("user", user_schema());
    adapter
}

/// One call observed by [`FaultyBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Get(String),
    Set(String),
    SetWithTtl(String, Duration),
    Ttl(String),
    Delete(String),
    DeleteMany(usize),
    KeysMatching(String),
}

/// Wraps a [`MemoryBackend`], logging every call and failing the operations
/// switched on.
#[derive(Default)]
pub struct FaultyBackend {
    inner: MemoryBackend,
    calls: Mutex<Vec<Call>>,
    pub fail_get: AtomicBool,
    pub fail_writes: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_scan: AtomicBool,
    /// `delete_many` calls that succeed before the rest fail.
    pub delete_many_budget: Option<AtomicUsize>,
}

impl FaultyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_delete_many_after(successes: usize) -> Self {
        Self { delete_many_budget: Some(AtomicUsize::new(successes)), ..Self::default() }
    }

    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("lock poisoned").clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("lock poisoned").push(call);
    }

    fn injected(flag: &AtomicBool) -> StorageResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StorageError::connection("injected failure"));
        }
        Ok(())
    }
}

fn text(key: &[u8]) -> String {
    String::from_utf8_lossy(key).into_owned()
}

#[async_trait]
impl StorageBackend for FaultyBackend {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        self.record(Call::Get(text(key)));
        Self::injected(&self.fail_get)?;
        self.inner.get(key).await
    }

    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        self.record(Call::Set(text(&key)));
        Self::injected(&self.fail_writes)?;
        self.inner.set(key, value).await
    }

    async fn set_with_ttl(&self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        self.record(Call::SetWithTtl(text(&key), ttl));
        Self::injected(&self.fail_writes)?;
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn ttl(&self, key: &[u8]) -> StorageResult<Option<Duration>> {
        self.record(Call::Ttl(text(key)));
        Self::injected(&self.fail_get)?;
        self.inner.ttl(key).await
    }

    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.record(Call::Delete(text(key)));
        Self::injected(&self.fail_delete)?;
        self.inner.delete(key).await
    }

    async fn delete_many(&self, keys: &[Vec<u8>]) -> StorageResult<usize> {
        self.record(Call::DeleteMany(keys.len()));
        Self::injected(&self.fail_delete)?;
        if let Some(budget) = &self.delete_many_budget
            && budget.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_err()
        {
            return Err(StorageError::timeout());
        }
        self.inner.delete_many(keys).await
    }

    async fn keys_matching(&self, pattern: &str) -> StorageResult<Vec<Vec<u8>>> {
        self.record(Call::KeysMatching(pattern.to_owned()));
        Self::injected(&self.fail_scan)?;
        self.inner.keys_matching(pattern).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.inner.health_check().await
    }
}
