//! Key-value connection abstraction for keyrecord.
//!
//! This crate provides the [`StorageBackend`] trait, the small key-value
//! transport that the record adapter in `keyrecord-adapter` is written
//! against, together with an in-memory implementation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ORM host                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  keyrecord-adapter                          │
//! │   RecordAdapter (define, describe, find, create, update,    │
//! │   destroy, drop) + SchemaRegistry                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  keyrecord-storage                          │
//! │               StorageBackend trait                          │
//! │  (get, set, set_with_ttl, delete, delete_many,              │
//! │   keys_matching)                                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    MemoryBackend                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//!
//! use keyrecord_storage::{MemoryBackend, StorageBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = MemoryBackend::new();
//!
//!     backend.set(b"user:123".to_vec(), b"Alice".to_vec()).await?;
//!     backend
//!         .set_with_ttl(b"session:9".to_vec(), b"token".to_vec(), Duration::from_secs(30))
//!         .await?;
//!
//!     let keys = backend.keys_matching("user:*").await?;
//!     assert_eq!(keys, vec![b"user:123".to_vec()]);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! All operations return [`StorageResult<T>`]. Backends map their internal
//! errors to [`StorageError`] variants and never retry on their own;
//! [`StorageError::is_transient`] tells callers which failures are worth
//! retrying.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` and `conformance` modules (key generator,
//!   assertion macros, the backend contract suite). Enable this in `[dev-dependencies]`.
//! - **`failpoints`**: Activates `fail` fail points (`health-check`).

#![deny(unsafe_code)]

pub mod backend;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod conformance;
pub mod error;
pub mod memory;
pub mod pattern;
pub mod size_limits;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;

// Re-export primary types at crate root for convenience
pub use backend::StorageBackend;
pub use error::{BoxError, ConfigError, StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use size_limits::{
    DEFAULT_MAX_KEY_SIZE, DEFAULT_MAX_VALUE_SIZE, SizeLimits, validate_key_size, validate_sizes,
};
