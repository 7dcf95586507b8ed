//! In-memory storage backend implementation.
//!
//! This module provides [`MemoryBackend`], an in-memory implementation of
//! [`StorageBackend`] suitable for testing, development and embedding.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Ordered storage**: Keys are stored in a [`BTreeMap`], so pattern scans return sorted keys
//! - **TTL support**: Expired keys are invisible immediately and swept by a background task
//! - **Size limits**: Optional [`SizeLimits`] enforced on every write
//!
//! # Example
//!
//! ```
//! use keyrecord_storage::{MemoryBackend, StorageBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = MemoryBackend::new();
//!
//!     backend.set(b"greeting".to_vec(), b"hello".to_vec()).await.unwrap();
//!     let value = backend.get(b"greeting").await.unwrap();
//!
//!     assert_eq!(value.unwrap().as_ref(), b"hello");
//! }
//! ```
//!
//! # Performance Characteristics
//!
//! | Operation | Complexity |
//! |-----------|------------|
//! | get | O(log n) |
//! | set | O(log n) |
//! | delete | O(log n) |
//! | keys_matching | O(n · m) where m is the pattern length |
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - The TTL sweep runs every second, so memory is reclaimed lazily

use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use fail::fail_point;
use parking_lot::RwLock;
use tokio::{select, sync::watch, time::sleep};

use crate::{
    backend::StorageBackend,
    error::{StorageError, StorageResult},
    pattern::glob_match,
    size_limits::{SizeLimits, validate_key_size, validate_sizes},
};

/// Interval between background sweeps of expired keys.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Holds the shutdown signal sender. When dropped, the watch channel
/// closes and the sweep task exits.
struct ShutdownGuard {
    shutdown_tx: watch::Sender<()>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        // The receiver may already be gone.
        let _ = self.shutdown_tx.send(());
    }
}

/// In-memory storage backend using [`BTreeMap`].
///
/// # Cloning
///
/// `MemoryBackend` is cheaply cloneable via [`Arc`]. All clones share the
/// same underlying data store.
///
/// # Shutdown
///
/// The background sweep stops automatically when all clones of the
/// `MemoryBackend` are dropped. [`shutdown`](Self::shutdown) stops it
/// explicitly.
#[derive(Clone)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Bytes>>>,
    ttl_data: Arc<RwLock<BTreeMap<Vec<u8>, Instant>>>,
    limits: Option<SizeLimits>,
    shutdown_guard: Arc<ShutdownGuard>,
}

impl MemoryBackend {
    /// Creates a new in-memory storage backend without size limits.
    ///
    /// This spawns the background sweep task, so it must be called from
    /// within a Tokio runtime.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates a backend that rejects keys and values above `limits`.
    pub fn with_size_limits(limits: SizeLimits) -> Self {
        Self::build(Some(limits))
    }

    fn build(limits: Option<SizeLimits>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let backend = Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            ttl_data: Arc::new(RwLock::new(BTreeMap::new())),
            limits,
            shutdown_guard: Arc::new(ShutdownGuard { shutdown_tx }),
        };

        // The sweep holds only the maps, so dropping the last handle drops the guard.
        let data = Arc::clone(&backend.data);
        let ttl_data = Arc::clone(&backend.ttl_data);
        tokio::spawn(sweep_expired_keys(data, ttl_data, shutdown_rx));

        backend
    }

    /// Explicitly signals the background sweep task to stop.
    ///
    /// Expired keys stay invisible to reads after shutdown; they are just no
    /// longer reclaimed.
    pub fn shutdown(&self) {
        let _ = self.shutdown_guard.shutdown_tx.send(());
    }

    /// Returns `true` if `key` carries an expiry that has elapsed.
    fn is_expired(&self, key: &[u8]) -> bool {
        self.ttl_data.read().get(key).is_some_and(|expiry| *expiry <= Instant::now())
    }

    fn check_write(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        match &self.limits {
            Some(limits) => validate_sizes(key, value, limits),
            None => Ok(()),
        }
    }

    fn check_key(&self, key: &[u8]) -> StorageResult<()> {
        match &self.limits {
            Some(limits) => validate_key_size(key, limits),
            None => Ok(()),
        }
    }
}

/// Removes keys whose TTL has elapsed, once per [`SWEEP_INTERVAL`], until the
/// shutdown signal arrives or the sender is dropped.
async fn sweep_expired_keys(
    data: Arc<RwLock<BTreeMap<Vec<u8>, Bytes>>>,
    ttl_data: Arc<RwLock<BTreeMap<Vec<u8>, Instant>>>,
    mut shutdown_rx: watch::Receiver<()>,
) {
    loop {
        select! {
            _ = sleep(SWEEP_INTERVAL) => {}
            _ = shutdown_rx.changed() => {
                return;
            }
        }

        let now = Instant::now();
        let expired: Vec<Vec<u8>> = ttl_data
            .read()
            .iter()
            .filter(|(_, expiry)| **expiry <= now)
            .map(|(key, _)| key.clone())
            .collect();

        if !expired.is_empty() {
            // Lock order: data, then ttl_data.
            let mut data_guard = data.write();
            let mut ttl_guard = ttl_data.write();
            for key in &expired {
                data_guard.remove(key);
                ttl_guard.remove(key);
            }
            tracing::trace!(swept = expired.len(), "removed expired keys");
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    #[tracing::instrument(skip_all, fields(key_len = key.len()))]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        self.check_key(key)?;
        if self.is_expired(key) {
            return Ok(None);
        }
        Ok(self.data.read().get(key).cloned())
    }

    #[tracing::instrument(skip_all, fields(key_len = key.len(), value_len = value.len()))]
    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        self.check_write(&key, &value)?;
        let mut data = self.data.write();
        let mut ttl_guard = self.ttl_data.write();
        ttl_guard.remove(&key);
        data.insert(key, Bytes::from(value));
        Ok(())
    }

    #[tracing::instrument(
        skip_all,
        fields(key_len = key.len(), ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX))
    )]
    async fn set_with_ttl(&self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        self.check_write(&key, &value)?;
        let expiry = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| StorageError::internal(format!("ttl of {ttl:?} overflows the clock")))?;

        let mut data = self.data.write();
        let mut ttl_guard = self.ttl_data.write();
        data.insert(key.clone(), Bytes::from(value));
        ttl_guard.insert(key, expiry);
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(key_len = key.len()))]
    async fn ttl(&self, key: &[u8]) -> StorageResult<Option<Duration>> {
        self.check_key(key)?;
        let now = Instant::now();
        let data = self.data.read();
        let ttl_guard = self.ttl_data.read();
        if !data.contains_key(key) {
            return Ok(None);
        }
        Ok(ttl_guard
            .get(key)
            .map(|expiry| expiry.saturating_duration_since(now))
            .filter(|remaining| !remaining.is_zero()))
    }

    #[tracing::instrument(skip_all, fields(key_len = key.len()))]
    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.check_key(key)?;
        let mut data = self.data.write();
        let mut ttl_guard = self.ttl_data.write();
        data.remove(key);
        ttl_guard.remove(key);
        Ok(())
    }

    /// Single write-lock acquisition for the whole batch.
    #[tracing::instrument(skip_all, fields(count = keys.len()))]
    async fn delete_many(&self, keys: &[Vec<u8>]) -> StorageResult<usize> {
        for key in keys {
            self.check_key(key)?;
        }
        let now = Instant::now();
        let mut data = self.data.write();
        let mut ttl_guard = self.ttl_data.write();

        let mut removed = 0;
        for key in keys {
            let live = ttl_guard.remove(key).is_none_or(|expiry| expiry > now);
            if data.remove(key).is_some() && live {
                removed += 1;
            }
        }
        Ok(removed)
    }

    #[tracing::instrument(skip(self))]
    async fn keys_matching(&self, pattern: &str) -> StorageResult<Vec<Vec<u8>>> {
        let now = Instant::now();
        let data = self.data.read();
        let ttl_guard = self.ttl_data.read();

        let keys = data
            .keys()
            .filter(|key| ttl_guard.get(*key).is_none_or(|expiry| *expiry > now))
            .filter(|key| glob_match(pattern.as_bytes(), key))
            .cloned()
            .collect();
        Ok(keys)
    }

    #[tracing::instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<()> {
        fail_point!("health-check", |_| {
            Err(StorageError::connection("injected health-check failure"))
        });
        // Acquiring the read lock proves we are not deadlocked.
        let _unused = self.data.read();
        Ok(())
    }
}
