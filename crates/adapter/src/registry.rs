//! Schema registry: collection schemas, primary keys and storage keys.
//!
//! The [`SchemaRegistry`] trait is everything the record adapter needs from a
//! schema layer. [`MemorySchemaRegistry`] keeps schemas in process and can
//! persist them to a [`StorageBackend`] on [`sync`](SchemaRegistry::sync).

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use keyrecord_storage::StorageBackend;
use parking_lot::RwLock;

use crate::{
    config::{AdapterConfig, DEFAULT_KEY_PREFIX},
    error::{AdapterError, AdapterResult},
    keys,
    record::Record,
    schema::CollectionSchema,
};

/// Segment that namespaces persisted schemas away from records.
const SCHEMA_NAMESPACE: &str = "_schema";

/// Registry of collection schemas.
///
/// Implementations must be thread-safe. Collection names arrive already
/// lower-cased.
#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    /// Registers or replaces the schema of `collection`.
    fn register_collection(&self, collection: &str, schema: CollectionSchema);

    /// Validates and persists every registered schema.
    async fn sync(&self) -> AdapterResult<()>;

    /// Returns the registered schema, if any.
    fn retrieve(&self, collection: &str) -> Option<CollectionSchema>;

    /// Returns the primary-key attribute of a registered collection.
    fn primary_key_of(&self, collection: &str) -> Option<String>;

    /// First segment of every key from [`record_key`](Self::record_key).
    fn key_prefix(&self) -> &str;

    /// Derives the storage key of a record.
    fn record_key(&self, collection: &str, pk_attribute: &str, pk_value: &str) -> String;

    /// Applies the collection's type coercions to a stored record.
    fn parse(&self, collection: &str, raw: Record) -> Record;
}

/// In-process [`SchemaRegistry`].
///
/// ```
/// use keyrecord_adapter::{
///     AttributeDefinition, AttributeType, CollectionSchema, MemorySchemaRegistry, SchemaRegistry,
/// };
///
/// let registry = MemorySchemaRegistry::new("app");
/// let schema: CollectionSchema =
///     [("email", AttributeDefinition::new(AttributeType::String).primary_key())]
///         .into_iter()
///         .collect();
/// registry.register_collection("user", schema);
///
/// assert_eq!(registry.primary_key_of("user").as_deref(), Some("email"));
/// assert_eq!(registry.record_key("user", "email", "a@b.c"), "app:user:email:a@b.c");
/// ```
#[derive(Clone)]
pub struct MemorySchemaRegistry {
    key_prefix: String,
    schemas: Arc<RwLock<HashMap<String, CollectionSchema>>>,
    backend: Option<Arc<dyn StorageBackend>>,
}

impl fmt::Debug for MemorySchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySchemaRegistry")
            .field("key_prefix", &self.key_prefix)
            .field("collections", &self.schemas.read().len())
            .field("persistent", &self.backend.is_some())
            .finish()
    }
}

impl Default for MemorySchemaRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

impl MemorySchemaRegistry {
    /// Creates a registry that keeps schemas in memory only.
    #[must_use]
    pub fn new(key_prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            schemas: Arc::new(RwLock::new(HashMap::new())),
            backend: None,
        }
    }

    /// Creates a registry using the key prefix of `config`.
    #[must_use]
    pub fn from_config(config: &AdapterConfig) -> Self {
        Self::new(config.key_prefix())
    }

    /// Creates a registry that writes schemas to `backend` on every sync.
    #[must_use]
    pub fn with_backend(key_prefix: impl Into<String>, backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend: Some(backend), ..Self::new(key_prefix) }
    }

    /// Storage key under which the schema of `collection` is persisted.
    #[must_use]
    pub fn schema_key(&self, collection: &str) -> String {
        format!(
            "{}:{SCHEMA_NAMESPACE}:{}",
            keys::sanitize(&self.key_prefix),
            keys::sanitize(collection)
        )
    }
}

#[async_trait]
impl SchemaRegistry for MemorySchemaRegistry {
    fn register_collection(&self, collection: &str, schema: CollectionSchema) {
        self.schemas.write().insert(collection.to_owned(), schema);
    }

    #[tracing::instrument(skip(self), fields(persistent = self.backend.is_some()))]
    async fn sync(&self) -> AdapterResult<()> {
        // Snapshot first; the lock must not be held across awaits.
        let mut snapshot: Vec<(String, CollectionSchema)> =
            self.schemas.read().iter().map(|(name, schema)| (name.clone(), schema.clone())).collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));

        for (collection, schema) in &snapshot {
            schema.validate(collection)?;
        }

        let Some(backend) = &self.backend else {
            return Ok(());
        };
        for (collection, schema) in &snapshot {
            let payload = serde_json::to_vec(schema).map_err(|e| {
                AdapterError::serialization_with_source(
                    format!("schema of `{collection}` is not serializable"),
                    e,
                )
            })?;
            backend.set(self.schema_key(collection).into_bytes(), payload).await?;
        }
        tracing::debug!(collections = snapshot.len(), "schemas persisted");
        Ok(())
    }

    fn retrieve(&self, collection: &str) -> Option<CollectionSchema> {
        self.schemas.read().get(collection).cloned()
    }

    fn primary_key_of(&self, collection: &str) -> Option<String> {
        self.schemas.read().get(collection).map(|schema| schema.primary_key().to_owned())
    }

    fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    fn record_key(&self, collection: &str, pk_attribute: &str, pk_value: &str) -> String {
        keys::record_key(&self.key_prefix, collection, pk_attribute, pk_value)
    }

    fn parse(&self, collection: &str, raw: Record) -> Record {
        match self.schemas.read().get(collection) {
            Some(schema) => schema.parse(raw),
            None => raw,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use keyrecord_storage::MemoryBackend;
    use serde_json::json;

    use super::*;
    use crate::schema::{AttributeDefinition, AttributeType};

    fn user_schema() -> CollectionSchema {
        [
            ("id", AttributeDefinition::new(AttributeType::String).primary_key()),
            ("age", AttributeDefinition::new(AttributeType::Integer)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn register_is_an_upsert() {
        let registry = MemorySchemaRegistry::default();
        registry.register_collection("user", CollectionSchema::default());
        registry.register_collection("user", user_schema());
        assert_eq!(registry.retrieve("user"), Some(user_schema()));
        assert_eq!(registry.retrieve("post"), None);
        assert_eq!(registry.primary_key_of("post"), None);
    }

    #[test]
    fn parse_uses_registered_types() {
        let registry = MemorySchemaRegistry::default();
        registry.register_collection("user", user_schema());
        let Some(raw) = json!({"id": "u1", "age": "41"}).as_object().cloned() else {
            unreachable!()
        };
        assert_eq!(registry.parse("user", raw.clone())["age"], json!(41));
        assert_eq!(registry.parse("unknown", raw.clone()), raw);
    }

    #[tokio::test]
    async fn sync_rejects_invalid_schema() {
        let registry = MemorySchemaRegistry::default();
        let broken: CollectionSchema = [
            ("a", AttributeDefinition::new(AttributeType::String).primary_key()),
            ("b", AttributeDefinition::new(AttributeType::String).primary_key()),
        ]
        .into_iter()
        .collect();
        registry.register_collection("broken", broken);
        let err = registry.sync().await.unwrap_err();
        assert!(matches!(err, AdapterError::InvalidSchema { ref collection, .. } if collection == "broken"));
    }

    #[tokio::test]
    async fn sync_persists_schemas_to_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let registry = MemorySchemaRegistry::with_backend("app", backend.clone());
        registry.register_collection("user", user_schema());
        registry.sync().await.unwrap();

        let stored = backend.get(b"app:_schema:user").await.unwrap().expect("schema stored");
        let schema: CollectionSchema = serde_json::from_slice(&stored).unwrap();
        assert_eq!(schema, user_schema());
    }

    #[test]
    fn schema_keys_never_collide_with_record_keys() {
        let registry = MemorySchemaRegistry::new("app");
        let record = registry.record_key("_schema", "id", "x");
        assert_ne!(registry.schema_key("id:x"), record);
        assert_eq!(registry.schema_key("id:x"), "app:_schema:id%3Ax");
    }
}
