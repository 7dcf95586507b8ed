//! The record adapter: collection-style CRUD over a [`StorageBackend`].
//!
//! Every record is addressed by its primary key alone. A [`Criteria`] is
//! resolved once per operation into a [`KeyLookup`]; only a single
//! primary-key equality (or, for `destroy`, an empty `where`) is accepted.
//! Bulk operations fan out through [`try_join_bounded`], so the first
//! failure wins and nothing completes after it.
//!
//! There is no isolation between the read and write halves of `update` or
//! `destroy`. The last writer wins.

use std::{collections::HashSet, sync::Arc, time::Duration};

use fail::fail_point;
use keyrecord_storage::{ConfigError, StorageBackend, StorageError};
use parking_lot::RwLock;

use crate::{
    config::AdapterConfig,
    criteria::{Criteria, KeyLookup},
    error::{AdapterError, AdapterResult},
    fanout::try_join_bounded,
    keys,
    record::{self, Expiry, PrimaryKeyValue, Record},
    registry::SchemaRegistry,
    schema::CollectionSchema,
};

/// Collections defined during the current session.
///
/// `describe` only reports a schema for collections in this set, even when
/// the registry knows the collection from an earlier sync. Hosts running
/// automatic migrations rely on this to tell "defined just now" apart from
/// "left over in the registry". Share one set between adapters to share a
/// session; use a fresh set for a fresh session.
#[derive(Debug, Clone, Default)]
pub struct DefinedCollections(Arc<RwLock<HashSet<String>>>);

impl DefinedCollections {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `collection` as defined. Returns `true` if it was not yet.
    pub fn mark(&self, collection: &str) -> bool {
        self.0.write().insert(collection.to_owned())
    }

    /// Returns whether `collection` was defined in this session.
    #[must_use]
    pub fn contains(&self, collection: &str) -> bool {
        self.0.read().contains(collection)
    }

    /// Number of defined collections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Returns `true` if nothing has been defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }
}

/// Collection-oriented CRUD over a key-value store.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use keyrecord_adapter::{Criteria, MemorySchemaRegistry, RecordAdapter};
/// use keyrecord_storage::MemoryBackend;
/// use serde_json::json;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let adapter = RecordAdapter::builder()
///     .backend(Arc::new(MemoryBackend::new()))
///     .registry(Arc::new(MemorySchemaRegistry::default()))
///     .build()
///     .unwrap();
/// adapter.define("user", Default::default());
///
/// let ann = json!({"id": "u1", "name": "Ann"}).as_object().cloned().unwrap();
/// adapter.create("user", ann.clone()).await.unwrap();
///
/// let found = adapter.find("user", &Criteria::by_key("id", "u1")).await.unwrap();
/// assert_eq!(found, vec![ann]);
/// # });
/// ```
pub struct RecordAdapter<B, R> {
    backend: Arc<B>,
    registry: Arc<R>,
    defined: DefinedCollections,
    config: AdapterConfig,
}

impl<B, R> Clone for RecordAdapter<B, R> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            registry: Arc::clone(&self.registry),
            defined: self.defined.clone(),
            config: self.config.clone(),
        }
    }
}

impl<B, R> std::fmt::Debug for RecordAdapter<B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordAdapter")
            .field("defined", &self.defined)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[bon::bon]
impl<B, R> RecordAdapter<B, R>
where
    B: StorageBackend + 'static,
    R: SchemaRegistry,
{
    /// Creates an adapter over `backend` and `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] if the registry derives keys under a
    /// prefix other than the configured one.
    #[builder]
    pub fn new(
        backend: Arc<B>,
        registry: Arc<R>,
        #[builder(default)] defined: DefinedCollections,
        #[builder(default)] config: AdapterConfig,
    ) -> AdapterResult<Self> {
        if registry.key_prefix() != config.key_prefix() {
            return Err(ConfigError::Invalid {
                field: "key_prefix",
                reason: format!(
                    "registry derives keys under `{}`, configured prefix is `{}`",
                    registry.key_prefix(),
                    config.key_prefix()
                ),
            }
            .into());
        }
        Ok(Self { backend, registry, defined, config })
    }

    /// Returns the adapter configuration.
    #[must_use]
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Returns the session's defined collections.
    #[must_use]
    pub fn defined_collections(&self) -> &DefinedCollections {
        &self.defined
    }

    /// Registers the schema of a collection.
    #[tracing::instrument(skip_all, fields(collection = %collection))]
    pub fn configure(&self, collection: &str, schema: CollectionSchema) {
        self.registry.register_collection(&collection.to_lowercase(), schema);
    }

    /// Validates and persists all registered schemas through the registry.
    ///
    /// # Errors
    ///
    /// Whatever the registry's `sync` reports, unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn sync(&self) -> AdapterResult<()> {
        self.registry.sync().await
    }

    /// Registers the schema and marks the collection as defined in this
    /// session. Returns `true` if the collection was not defined before.
    #[tracing::instrument(skip_all, fields(collection = %collection))]
    pub fn define(&self, collection: &str, schema: CollectionSchema) -> bool {
        let collection = collection.to_lowercase();
        self.registry.register_collection(&collection, schema);
        self.defined.mark(&collection)
    }

    /// Returns the registered schema of a collection.
    ///
    /// `None` when the schema has no attributes or the collection was not
    /// defined in this session.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::CollectionNotRegistered`] if the registry has
    /// nothing for the collection.
    #[tracing::instrument(skip_all, fields(collection = %collection))]
    pub fn describe(&self, collection: &str) -> AdapterResult<Option<CollectionSchema>> {
        let collection = collection.to_lowercase();
        let schema =
            self.registry.retrieve(&collection).ok_or_else(|| AdapterError::not_registered(&collection))?;
        if schema.is_empty() || !self.defined.contains(&collection) {
            return Ok(None);
        }
        Ok(Some(schema))
    }

    /// Deletes every record of a collection. The registration is kept.
    ///
    /// Returns the number of records removed. `relations` is accepted for
    /// interface compatibility and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::CollectionNotRegistered`] for an unknown
    /// collection, or the first storage error hit by the scan or any delete
    /// batch. Batches already running when an error surfaces are aborted.
    #[tracing::instrument(skip_all, fields(collection = %collection))]
    pub async fn drop(&self, collection: &str, _relations: &[String]) -> AdapterResult<usize> {
        let collection = collection.to_lowercase();
        let pk_attribute = self.primary_key(&collection)?;

        let pattern = keys::scan_pattern(&self.registry.record_key(&collection, &pk_attribute, ""));
        tracing::trace!(%pattern, "scanning collection keys");

        let matched = self.backend.keys_matching(&pattern).await?;
        let batches: Vec<Vec<Vec<u8>>> =
            matched.chunks(self.config.drop_batch_size()).map(<[Vec<u8>]>::to_vec).collect();

        let removed: usize = try_join_bounded(batches, self.config.max_concurrency(), |batch| {
            let backend = Arc::clone(&self.backend);
            async move { backend.delete_many(&batch).await.map_err(AdapterError::from) }
        })
        .await?
        .into_iter()
        .sum();

        tracing::debug!(scanned = matched.len(), removed, "collection dropped");
        Ok(removed)
    }

    /// Finds the record addressed by `criteria`.
    ///
    /// Returns zero or one record, coerced through the registry.
    ///
    /// # Errors
    ///
    /// - [`AdapterError::CollectionNotRegistered`] for an unknown collection
    /// - [`AdapterError::InvalidCriteria`] unless `criteria` is a single
    ///   primary-key equality
    /// - [`AdapterError::Serialization`] if the stored value is not a record
    /// - [`AdapterError::Storage`] on backend failure
    #[tracing::instrument(skip_all, fields(collection = %collection))]
    pub async fn find(&self, collection: &str, criteria: &Criteria) -> AdapterResult<Vec<Record>> {
        let collection = collection.to_lowercase();
        let pk_attribute = self.primary_key(&collection)?;
        let pk = Self::require_primary_key(&collection, criteria.resolve(&pk_attribute))?;

        let key = self.registry.record_key(&collection, &pk_attribute, &pk.key_segment());
        let found = self.fetch(&key).await?;
        Ok(found.map(|raw| self.registry.parse(&collection, raw)).into_iter().collect())
    }

    /// Writes a new record and returns it as the store yields it back.
    ///
    /// An existing record with the same primary key is overwritten.
    ///
    /// # Errors
    ///
    /// - [`AdapterError::CollectionNotRegistered`] for an unknown collection
    /// - [`AdapterError::MissingPrimaryKey`] if `data` has no usable
    ///   primary-key value
    /// - [`AdapterError::InvalidTtl`] for a malformed TTL attribute
    /// - [`AdapterError::Storage`] on backend failure, including
    ///   [`StorageError::NotFound`] if the record expired before it could be
    ///   read back
    #[tracing::instrument(skip_all, fields(collection = %collection))]
    pub async fn create(&self, collection: &str, data: Record) -> AdapterResult<Record> {
        let collection = collection.to_lowercase();
        let pk_attribute = self.primary_key(&collection)?;
        let pk = data.get(&pk_attribute).and_then(PrimaryKeyValue::from_value).ok_or_else(|| {
            AdapterError::MissingPrimaryKey {
                collection: collection.clone(),
                attribute: pk_attribute.clone(),
            }
        })?;

        let key = self.registry.record_key(&collection, &pk_attribute, &pk.key_segment());
        self.writer().write(&key, &data, None).await?;

        let stored = self.fetch(&key).await?.ok_or_else(|| StorageError::not_found(key.as_str()))?;
        Ok(self.registry.parse(&collection, stored))
    }

    /// Merges `values` into the record addressed by `criteria`.
    ///
    /// The primary-key attribute is removed from `values` before merging, so
    /// repeating the current value is accepted and changes nothing. A record
    /// written with an expiry keeps its remaining lifetime unless the merged
    /// record carries the TTL attribute. Returns the merged records (zero or
    /// one).
    ///
    /// # Errors
    ///
    /// - [`AdapterError::PrimaryKeyUpdateForbidden`] if `values` carries a
    ///   different primary-key value
    /// - the errors of [`find`](Self::find) and of the write
    #[tracing::instrument(skip_all, fields(collection = %collection))]
    pub async fn update(
        &self,
        collection: &str,
        criteria: &Criteria,
        mut values: Record,
    ) -> AdapterResult<Vec<Record>> {
        let collection = collection.to_lowercase();
        let pk_attribute = self.primary_key(&collection)?;
        let pk = Self::require_primary_key(&collection, criteria.resolve(&pk_attribute))?;

        if let Some(requested) = values.remove(&pk_attribute) {
            let unchanged = PrimaryKeyValue::from_value(&requested)
                .is_some_and(|requested| requested.addresses_same_record(&pk));
            if !unchanged {
                return Err(AdapterError::PrimaryKeyUpdateForbidden {
                    collection,
                    attribute: pk_attribute,
                });
            }
        }

        let key = self.registry.record_key(&collection, &pk_attribute, &pk.key_segment());
        // Read before the record so an expiry elapsing in between hides the record too.
        let remaining = if values.contains_key(self.config.ttl_attribute()) {
            None
        } else {
            self.backend.ttl(key.as_bytes()).await?
        };
        let matched: Vec<Record> = self
            .fetch(&key)
            .await?
            .map(|raw| self.registry.parse(&collection, raw))
            .into_iter()
            .collect();

        let values = Arc::new(values);
        let updated = try_join_bounded(matched, self.config.max_concurrency(), |existing| {
            let writer = self.writer();
            let values = Arc::clone(&values);
            let key = key.clone();
            async move {
                let merged = record::merge(existing, &values);
                writer.write(&key, &merged, remaining).await?;
                Ok::<_, AdapterError>(merged)
            }
        })
        .await?;

        tracing::debug!(updated = updated.len(), "records updated");
        Ok(updated)
    }

    /// Removes the record addressed by `criteria` and returns it as stored.
    ///
    /// An empty `where` removes the whole collection through
    /// [`drop`](Self::drop) and returns an empty list.
    ///
    /// # Errors
    ///
    /// [`AdapterError::InvalidCriteria`] for any other criteria shape, plus
    /// the errors of [`find`](Self::find).
    #[tracing::instrument(skip_all, fields(collection = %collection))]
    pub async fn destroy(&self, collection: &str, criteria: &Criteria) -> AdapterResult<Vec<Record>> {
        let collection = collection.to_lowercase();
        let pk_attribute = self.primary_key(&collection)?;

        let pk = match criteria.resolve(&pk_attribute) {
            KeyLookup::PrimaryKey(pk) => pk,
            KeyLookup::All => {
                self.drop(&collection, &[]).await?;
                return Ok(Vec::new());
            },
            KeyLookup::Unsupported(reason) => {
                return Err(AdapterError::invalid_criteria(collection, reason));
            },
        };

        let key = self.registry.record_key(&collection, &pk_attribute, &pk.key_segment());
        let Some(existing) = self.fetch(&key).await? else {
            return Ok(Vec::new());
        };
        self.backend.delete(key.as_bytes()).await?;
        Ok(vec![existing])
    }

    /// Checks that the backend can serve requests.
    ///
    /// # Errors
    ///
    /// The backend's health-check error, unchanged.
    pub async fn health_check(&self) -> AdapterResult<()> {
        Ok(self.backend.health_check().await?)
    }

    fn primary_key(&self, collection: &str) -> AdapterResult<String> {
        self.registry.primary_key_of(collection).ok_or_else(|| AdapterError::not_registered(collection))
    }

    fn require_primary_key(collection: &str, lookup: KeyLookup) -> AdapterResult<PrimaryKeyValue> {
        match lookup {
            KeyLookup::PrimaryKey(pk) => Ok(pk),
            KeyLookup::All => {
                Err(AdapterError::invalid_criteria(collection, "no condition given"))
            },
            KeyLookup::Unsupported(reason) => Err(AdapterError::invalid_criteria(collection, reason)),
        }
    }

    async fn fetch(&self, key: &str) -> AdapterResult<Option<Record>> {
        tracing::trace!(key, "fetching record");
        self.backend.get(key.as_bytes()).await?.map(|bytes| decode(key, &bytes)).transpose()
    }

    fn writer(&self) -> RecordWriter<B> {
        RecordWriter {
            backend: Arc::clone(&self.backend),
            ttl_attribute: self.config.ttl_attribute().to_owned(),
            persist_ttl_attribute: self.config.persist_ttl_attribute(),
        }
    }
}

/// The TTL-aware write primitive shared by `create` and `update`.
struct RecordWriter<B> {
    backend: Arc<B>,
    ttl_attribute: String,
    persist_ttl_attribute: bool,
}

impl<B: StorageBackend> RecordWriter<B> {
    /// Writes `data` at `key`. `remaining` is the expiry to keep when `data`
    /// has no TTL attribute of its own.
    async fn write(
        &self,
        key: &str,
        data: &Record,
        remaining: Option<Duration>,
    ) -> AdapterResult<()> {
        fail_point!("adapter-before-write", |_| {
            Err(StorageError::connection("injected failure before write").into())
        });

        let expiry = match (record::ttl_of(data, &self.ttl_attribute)?, remaining) {
            (Expiry::Never, Some(ttl)) if !data.contains_key(&self.ttl_attribute) => {
                Expiry::After(ttl)
            },
            (expiry, _) => expiry,
        };
        let payload = if self.persist_ttl_attribute || !data.contains_key(&self.ttl_attribute) {
            serde_json::to_vec(data)
        } else {
            let mut stripped = data.clone();
            stripped.remove(&self.ttl_attribute);
            serde_json::to_vec(&stripped)
        }
        .map_err(|e| {
            AdapterError::serialization_with_source(format!("record at `{key}` is not serializable"), e)
        })?;

        tracing::trace!(key, ?expiry, "writing record");
        let key = key.as_bytes().to_vec();
        match expiry {
            Expiry::Never => self.backend.set(key, payload).await?,
            Expiry::After(ttl) => self.backend.set_with_ttl(key, payload, ttl).await?,
        }
        Ok(())
    }
}

fn decode(key: &str, bytes: &[u8]) -> AdapterResult<Record> {
    serde_json::from_slice(bytes).map_err(|e| {
        AdapterError::serialization_with_source(format!("value at `{key}` is not a stored record"), e)
    })
}
