//! Collection-style CRUD over a key-value store.
//!
//! [`RecordAdapter`] makes a [`StorageBackend`](keyrecord_storage::StorageBackend)
//! look like a minimal document store. Each collection has one primary-key
//! attribute; a record is stored as JSON under a key derived from its
//! collection and primary-key value, so every read, write and delete is a
//! single key lookup. There are no secondary indexes, no predicate scans and
//! no multi-key transactions.
//!
//! # Operations
//!
//! | Operation | Behavior |
//! |-----------|----------|
//! | [`configure`](RecordAdapter::configure) | register a collection's schema |
//! | [`define`](RecordAdapter::define) | register and mark as defined in this session |
//! | [`describe`](RecordAdapter::describe) | schema of a collection defined in this session |
//! | [`find`](RecordAdapter::find) | zero or one record, by primary key |
//! | [`create`](RecordAdapter::create) | write a record and read it back |
//! | [`update`](RecordAdapter::update) | shallow-merge values into a record |
//! | [`destroy`](RecordAdapter::destroy) | remove a record, or the whole collection |
//! | [`drop`](RecordAdapter::drop) | remove every record of a collection |
//!
//! # Time to live
//!
//! A record carrying the TTL attribute (`_ttl` by default) is written with an
//! expiry of that many seconds. `-1`, `0` or a missing attribute mean no
//! expiry. The attribute is removed from the stored payload unless
//! [`AdapterConfig::persist_ttl_attribute`] is set. An `update` that does not
//! set the attribute keeps the record's remaining lifetime.
//!
//! # Feature Flags
//!
//! - **`failpoints`**: Activates the `adapter-before-write` fail point.

#![deny(unsafe_code)]

mod adapter;
pub mod config;
pub mod criteria;
pub mod error;
pub mod fanout;
pub mod keys;
pub mod record;
pub mod registry;
pub mod schema;

pub use adapter::{DefinedCollections, RecordAdapter};
pub use config::AdapterConfig;
pub use criteria::{Criteria, KeyLookup};
pub use error::{AdapterError, AdapterResult};
pub use record::{PrimaryKeyValue, Record};
pub use registry::{MemorySchemaRegistry, SchemaRegistry};
pub use schema::{AttributeDefinition, AttributeType, CollectionSchema};
