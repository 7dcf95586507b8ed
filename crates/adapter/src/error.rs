//! Error types for record adapter operations.
//!
//! Every failure is returned to the immediate caller. The adapter neither
//! retries nor logs errors; storage failures pass through untouched inside
//! [`AdapterError::Storage`].

use std::sync::Arc;

use keyrecord_storage::{BoxError, ConfigError, StorageError};
use thiserror::Error;

/// Result type alias for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Errors produced by [`RecordAdapter`](crate::RecordAdapter) and the
/// schema registry glue.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdapterError {
    /// The registry holds nothing for this collection.
    #[error("collection `{collection}` is not registered")]
    CollectionNotRegistered {
        /// The (lower-cased) collection name.
        collection: String,
    },

    /// The criteria is not a single primary-key equality (or, for destroy,
    /// an empty `where`).
    #[error("primary key required for `{collection}`: {reason}")]
    InvalidCriteria {
        /// The collection the criteria was aimed at.
        collection: String,
        /// What was wrong with the criteria shape.
        reason: String,
    },

    /// An update tried to change a record's primary key.
    #[error("primary key `{attribute}` of `{collection}` cannot be updated")]
    PrimaryKeyUpdateForbidden {
        /// The collection being updated.
        collection: String,
        /// The primary-key attribute.
        attribute: String,
    },

    /// A record handed to `create` carries no usable primary-key value.
    #[error("record for `{collection}` has no usable value for primary key `{attribute}`")]
    MissingPrimaryKey {
        /// The collection being written.
        collection: String,
        /// The primary-key attribute.
        attribute: String,
    },

    /// The TTL attribute holds a value that is neither a lifetime nor the
    /// no-expiry sentinel.
    #[error("invalid ttl {value}: expected a positive number of seconds or -1")]
    InvalidTtl {
        /// The offending value, rendered as JSON.
        value: String,
    },

    /// A payload could not be turned into storage text, or stored text could
    /// not be read back as a record.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// A registered schema failed validation during `sync`.
    #[error("invalid schema for `{collection}`: {reason}")]
    InvalidSchema {
        /// The collection whose schema was rejected.
        collection: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Adapter configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The key-value store failed; propagated verbatim.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A concurrent task of a bulk operation panicked or was cancelled.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl AdapterError {
    /// Creates a `CollectionNotRegistered` error.
    #[must_use]
    pub fn not_registered(collection: impl Into<String>) -> Self {
        Self::CollectionNotRegistered { collection: collection.into() }
    }

    /// Creates an `InvalidCriteria` error.
    #[must_use]
    pub fn invalid_criteria(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCriteria { collection: collection.into(), reason: reason.into() }
    }

    /// Creates a `Serialization` error with a source.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates an `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }
}
