//! Configuration for the record adapter.
//!
//! [`AdapterConfig`] controls how storage keys are namespaced, which record
//! attribute carries the time-to-live, and how wide bulk operations fan out.
//! It can be built in code through its validating builder or deserialized
//! from a host's configuration file.
//!
//! # Example
//!
//! ```
//! use keyrecord_adapter::AdapterConfig;
//!
//! let config = AdapterConfig::builder()
//!     .key_prefix("app")
//!     .max_concurrency(4)
//!     .build()?;
//! assert_eq!(config.ttl_attribute(), "_ttl");
//! # Ok::<(), keyrecord_storage::ConfigError>(())
//! ```

use keyrecord_storage::{ConfigError, pattern::GLOB_METACHARACTERS};
use serde::{Deserialize, Serialize};

/// Default namespace prefix of every storage key.
pub const DEFAULT_KEY_PREFIX: &str = "waterline";

/// Default name of the reserved time-to-live attribute.
pub const DEFAULT_TTL_ATTRIBUTE: &str = "_ttl";

/// Default bound on concurrently running fan-out tasks.
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Default number of keys removed per `delete_many` call during `drop`.
pub const DEFAULT_DROP_BATCH_SIZE: usize = 64;

/// Adapter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdapterConfig {
    /// First segment of every storage key.
    #[serde(default = "default_key_prefix")]
    pub(crate) key_prefix: String,

    /// Record attribute holding the time-to-live in seconds.
    #[serde(default = "default_ttl_attribute")]
    pub(crate) ttl_attribute: String,

    /// Keep the TTL attribute inside the stored payload.
    #[serde(default)]
    pub(crate) persist_ttl_attribute: bool,

    /// Upper bound on concurrent tasks in `drop` and `update`.
    #[serde(default = "default_max_concurrency")]
    pub(crate) max_concurrency: usize,

    /// Keys per `delete_many` request in `drop`.
    #[serde(default = "default_drop_batch_size")]
    pub(crate) drop_batch_size: usize,
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_owned()
}

fn default_ttl_attribute() -> String {
    DEFAULT_TTL_ATTRIBUTE.to_owned()
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_drop_batch_size() -> usize {
    DEFAULT_DROP_BATCH_SIZE
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            ttl_attribute: default_ttl_attribute(),
            persist_ttl_attribute: false,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            drop_batch_size: DEFAULT_DROP_BATCH_SIZE,
        }
    }
}

#[bon::bon]
impl AdapterConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - `key_prefix` is empty or contains a glob metacharacter or `:`
    /// - `ttl_attribute` is empty
    /// - `max_concurrency` or `drop_batch_size` is zero
    #[builder]
    pub fn new(
        #[builder(into, default = DEFAULT_KEY_PREFIX.to_owned())] key_prefix: String,
        #[builder(into, default = DEFAULT_TTL_ATTRIBUTE.to_owned())] ttl_attribute: String,
        #[builder(default)] persist_ttl_attribute: bool,
        #[builder(default = DEFAULT_MAX_CONCURRENCY)] max_concurrency: usize,
        #[builder(default = DEFAULT_DROP_BATCH_SIZE)] drop_batch_size: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            key_prefix,
            ttl_attribute,
            persist_ttl_attribute,
            max_concurrency,
            drop_batch_size,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the builder enforces. Call this after
    /// deserializing a configuration.
    ///
    /// # Errors
    ///
    /// See [`AdapterConfig::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_prefix.is_empty() {
            return Err(ConfigError::Invalid { field: "key_prefix", reason: "empty".into() });
        }
        if self.key_prefix.bytes().any(|b| b == b':' || GLOB_METACHARACTERS.contains(&b)) {
            return Err(ConfigError::Invalid {
                field: "key_prefix",
                reason: format!("`{}` contains `:` or a glob metacharacter", self.key_prefix),
            });
        }
        if self.ttl_attribute.is_empty() {
            return Err(ConfigError::Invalid { field: "ttl_attribute", reason: "empty".into() });
        }
        for (field, value) in
            [("max_concurrency", self.max_concurrency), ("drop_batch_size", self.drop_batch_size)]
        {
            if value == 0 {
                return Err(ConfigError::BelowMinimum {
                    field,
                    min: "1".into(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Returns the storage key prefix.
    #[must_use]
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Returns the name of the TTL attribute.
    #[must_use]
    pub fn ttl_attribute(&self) -> &str {
        &self.ttl_attribute
    }

    /// Returns whether the TTL attribute is stored with the record.
    #[must_use]
    pub fn persist_ttl_attribute(&self) -> bool {
        self.persist_ttl_attribute
    }

    /// Returns the fan-out concurrency bound.
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Returns the `delete_many` batch size used by `drop`.
    #[must_use]
    pub fn drop_batch_size(&self) -> usize {
        self.drop_batch_size
    }
}
