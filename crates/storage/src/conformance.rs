//! Conformance test suite for [`StorageBackend`] implementations.
//!
//! Async functions that check a backend against the trait contract the record
//! adapter relies on. Any backend can run the same suite by calling each
//! function with a fresh instance:
//!
//! ```no_run
//! use keyrecord_storage::{MemoryBackend, conformance};
//!
//! #[tokio::test]
//! async fn crud_get_returns_none_for_missing_key() {
//!     conformance::crud_get_returns_none_for_missing_key(&MemoryBackend::new()).await;
//! }
//! ```
//!
//! | Category | Contract aspect |
//! |----------|-----------------|
//! | CRUD | get/set/delete semantics |
//! | TTL | `set_with_ttl` expiration, `set` clearing expiry, `ttl` lookup |
//! | Scan | `keys_matching` filtering and ordering |
//! | Bulk | `delete_many` counting |
//! | Concurrent | parallel writers on distinct keys |

use std::{sync::Arc, time::Duration};

use bytes::Bytes;

use crate::{backend::StorageBackend, testutil::make_key};

// ============================================================================
// CRUD
// ============================================================================

/// `get` on a nonexistent key returns `Ok(None)`.
pub async fn crud_get_returns_none_for_missing_key<B: StorageBackend>(backend: &B) {
    let value = crate::assert_storage_ok!(backend.get(b"nonexistent").await, "get on missing key");
    assert_eq!(value, None, "missing key should return None");
}

/// `set` then `get` round-trips the value.
pub async fn crud_set_then_get_returns_value<B: StorageBackend>(backend: &B) {
    backend.set(b"k1".to_vec(), b"v1".to_vec()).await.expect("set should succeed");
    let val = backend.get(b"k1").await.expect("get should succeed");
    assert_eq!(val, Some(Bytes::from("v1")));
}

/// `set` on an existing key overwrites the value (last write wins).
pub async fn crud_set_overwrites_existing<B: StorageBackend>(backend: &B) {
    backend.set(b"k1".to_vec(), b"original".to_vec()).await.expect("set");
    backend.set(b"k1".to_vec(), b"updated".to_vec()).await.expect("overwrite");
    let val = backend.get(b"k1").await.expect("get");
    assert_eq!(val, Some(Bytes::from("updated")));
}

/// `delete` on a nonexistent key is a silent no-op.
pub async fn crud_delete_nonexistent_is_noop<B: StorageBackend>(backend: &B) {
    crate::assert_storage_ok!(backend.delete(b"ghost").await, "delete of nonexistent key");
}

/// `delete` removes a previously-set key.
pub async fn crud_delete_removes_key<B: StorageBackend>(backend: &B) {
    backend.set(b"k2".to_vec(), b"val".to_vec()).await.expect("set");
    backend.delete(b"k2").await.expect("delete");
    let val = backend.get(b"k2").await.expect("get after delete");
    assert_eq!(val, None, "key should be gone after delete");
}

// ============================================================================
// TTL
// ============================================================================

/// A key written with a TTL is readable before it expires.
pub async fn ttl_key_readable_before_expiry<B: StorageBackend>(backend: &B) {
    backend
        .set_with_ttl(b"ttl:1".to_vec(), b"v".to_vec(), Duration::from_secs(60))
        .await
        .expect("set_with_ttl");
    assert_eq!(backend.get(b"ttl:1").await.expect("get"), Some(Bytes::from("v")));
}

/// A key written with a TTL is unreadable after it expires.
pub async fn ttl_key_unreadable_after_expiry<B: StorageBackend>(backend: &B) {
    backend
        .set_with_ttl(b"ttl:2".to_vec(), b"v".to_vec(), Duration::from_millis(50))
        .await
        .expect("set_with_ttl");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(backend.get(b"ttl:2").await.expect("get"), None, "key should have expired");
}

/// A plain `set` after `set_with_ttl` makes the key permanent.
pub async fn ttl_plain_set_clears_expiry<B: StorageBackend>(backend: &B) {
    backend
        .set_with_ttl(b"ttl:3".to_vec(), b"temp".to_vec(), Duration::from_millis(50))
        .await
        .expect("set_with_ttl");
    backend.set(b"ttl:3".to_vec(), b"kept".to_vec()).await.expect("set");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(backend.get(b"ttl:3").await.expect("get"), Some(Bytes::from("kept")));
}

/// `ttl` reports the remaining lifetime of expiring keys only.
pub async fn ttl_reports_remaining_lifetime<B: StorageBackend>(backend: &B) {
    backend
        .set_with_ttl(b"ttl:4".to_vec(), b"v".to_vec(), Duration::from_secs(60))
        .await
        .expect("set_with_ttl");
    backend.set(b"ttl:5".to_vec(), b"v".to_vec()).await.expect("set");

    let remaining = backend.ttl(b"ttl:4").await.expect("ttl").expect("expiry should be reported");
    assert!(remaining <= Duration::from_secs(60));
    assert!(remaining > Duration::from_secs(50));
    assert_eq!(backend.ttl(b"ttl:5").await.expect("ttl"), None);
    assert_eq!(backend.ttl(b"ttl:missing").await.expect("ttl"), None);
}

// ============================================================================
// Scan
// ============================================================================

/// `keys_matching` returns only keys under the pattern's prefix, sorted.
pub async fn scan_prefix_pattern_is_exact<B: StorageBackend>(backend: &B) {
    for key in ["w:post:id:2", "w:post:id:1", "w:posts:id:1", "w:user:id:1"] {
        backend.set(key.as_bytes().to_vec(), b"{}".to_vec()).await.expect("set");
    }
    let keys = backend.keys_matching("w:post:id:*").await.expect("keys_matching");
    assert_eq!(keys, vec![b"w:post:id:1".to_vec(), b"w:post:id:2".to_vec()]);
}

/// `keys_matching` on an empty namespace returns an empty list, not an error.
pub async fn scan_empty_namespace<B: StorageBackend>(backend: &B) {
    let keys = backend.keys_matching("nothing:here:*").await.expect("keys_matching");
    assert!(keys.is_empty(), "expected no keys, got {keys:?}");
}

// ============================================================================
// Bulk
// ============================================================================

/// `delete_many` removes every listed key and counts only the ones that existed.
pub async fn bulk_delete_many_counts_existing<B: StorageBackend>(backend: &B) {
    backend.set(b"bulk:a".to_vec(), b"1".to_vec()).await.expect("set");
    backend.set(b"bulk:b".to_vec(), b"2".to_vec()).await.expect("set");
    let removed = backend
        .delete_many(&[b"bulk:a".to_vec(), b"bulk:b".to_vec(), b"bulk:zzz".to_vec()])
        .await
        .expect("delete_many");
    assert_eq!(removed, 2);
    assert!(backend.keys_matching("bulk:*").await.expect("scan").is_empty());
}

// ============================================================================
// Concurrent
// ============================================================================

/// Parallel writers on distinct keys all land.
pub async fn concurrent_distinct_writers<B: StorageBackend + 'static>(backend: Arc<B>) {
    let mut set = tokio::task::JoinSet::new();
    for task in 0..8usize {
        let backend = Arc::clone(&backend);
        set.spawn(async move {
            for i in 0..25usize {
                let key = make_key(&format!("conc:{task}"), i);
                backend.set(key, b"v".to_vec()).await.expect("concurrent set");
            }
        });
    }
    while let Some(joined) = set.join_next().await {
        joined.expect("writer task panicked");
    }
    let keys = backend.keys_matching("conc:*").await.expect("scan");
    assert_eq!(keys.len(), 8 * 25);
}
