//! Storage backend trait definition.
//!
//! This module defines the [`StorageBackend`] trait, the minimal key-value
//! transport the record adapter is written against. All storage
//! implementations implement this trait.
//!
//! # Design Philosophy
//!
//! - **Keys and values are bytes**: No assumptions about serialization format
//! - **Async by default**: All operations are async for non-blocking I/O
//! - **Pattern scans, not ranges**: Keys are enumerated with glob patterns, the
//!   way a key-value server exposes them
//! - **Object safe**: Backends can be shared as `Arc<dyn StorageBackend>`
//!
//! Domain logic (collections, primary keys, schema coercion) lives in the
//! layer built on top of this trait, not in the backends.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageResult;

/// Abstract storage backend for key-value operations.
///
/// Backends are expected to be thread-safe (`Send + Sync`) and support
/// concurrent operations. Concurrency control is the backend's business:
/// callers hold no locks of their own.
///
/// # Key Operations
///
/// | Method | Description |
/// |--------|-------------|
/// | [`get`](StorageBackend::get) | Retrieve a single value by key |
/// | [`set`](StorageBackend::set) | Store a key-value pair without expiry |
/// | [`set_with_ttl`](StorageBackend::set_with_ttl) | Store with automatic expiration |
/// | [`ttl`](StorageBackend::ttl) | Remaining lifetime of a key |
/// | [`delete`](StorageBackend::delete) | Remove a key |
/// | [`delete_many`](StorageBackend::delete_many) | Remove several keys |
/// | [`keys_matching`](StorageBackend::keys_matching) | Enumerate keys by glob pattern |
/// | [`health_check`](StorageBackend::health_check) | Verify backend availability |
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use keyrecord_storage::{MemoryBackend, StorageBackend};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let backend = MemoryBackend::new();
///
/// backend.set(b"key".to_vec(), b"value".to_vec()).await.unwrap();
/// let value = backend.get(b"key").await.unwrap();
/// assert_eq!(value, Some(Bytes::from("value")));
/// # });
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieves a value by key.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(bytes))` if the key exists and has not expired
    /// - `Ok(None)` if the key doesn't exist
    /// - `Err(...)` on storage errors
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    /// Stores a key-value pair.
    ///
    /// If the key already exists, its value is overwritten and any expiry
    /// previously attached to it is cleared.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()>;

    /// Stores a key-value pair that expires after `ttl`.
    ///
    /// Once the TTL elapses the key is treated as absent by every read path,
    /// whether or not the backend has physically removed it yet.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set_with_ttl(&self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) -> StorageResult<()>;

    /// Returns the remaining lifetime of a key.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(remaining))` if the key is live and carries an expiry
    /// - `Ok(None)` if the key has no expiry, has expired, or doesn't exist
    /// - `Err(...)` on storage errors
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn ttl(&self, key: &[u8]) -> StorageResult<Option<Duration>>;

    /// Deletes a key.
    ///
    /// If the key doesn't exist, this is a no-op (returns `Ok(())`).
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// Deletes several keys, returning how many of them existed.
    ///
    /// The default implementation checks and deletes each key in turn.
    /// Backends with a native multi-key delete should override it.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete_many(&self, keys: &[Vec<u8>]) -> StorageResult<usize> {
        let mut removed = 0;
        for key in keys {
            if self.get(key).await?.is_some() {
                removed += 1;
            }
            self.delete(key).await?;
        }
        Ok(removed)
    }

    /// Returns every live key matching `pattern`, in ascending byte order.
    ///
    /// See [`pattern`](crate::pattern) for the accepted syntax.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn keys_matching(&self, pattern: &str) -> StorageResult<Vec<Vec<u8>>>;

    /// Checks that the backend can serve requests.
    #[must_use = "health check results indicate backend availability and must be inspected"]
    async fn health_check(&self) -> StorageResult<()>;
}
