//! Query criteria and their resolution to a storage lookup.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{PrimaryKeyValue, Record};

/// A query descriptor. Only `where` is understood.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Criteria {
    /// Attribute equality conditions.
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<Record>,
}

/// What a [`Criteria`] addresses once the primary key is known.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyLookup {
    /// Exactly one record, by primary key.
    PrimaryKey(PrimaryKeyValue),
    /// Every record of the collection (absent or empty `where`).
    All,
    /// Anything else. Carries a description of the offending shape.
    Unsupported(String),
}

impl Criteria {
    /// Criteria addressing the record whose `attribute` equals `value`.
    #[must_use]
    pub fn by_key(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut conditions = Record::new();
        conditions.insert(attribute.into(), value.into());
        Self { where_clause: Some(conditions) }
    }

    /// Criteria with an empty `where`, addressing the whole collection.
    #[must_use]
    pub fn all() -> Self {
        Self { where_clause: Some(Record::new()) }
    }

    /// Resolves the criteria against the collection's primary-key attribute.
    #[must_use]
    pub fn resolve(&self, pk_attribute: &str) -> KeyLookup {
        let conditions = match &self.where_clause {
            None => return KeyLookup::All,
            Some(conditions) if conditions.is_empty() => return KeyLookup::All,
            Some(conditions) => conditions,
        };

        if conditions.len() > 1 {
            return KeyLookup::Unsupported(format!(
                "{} conditions given, only a single `{pk_attribute}` equality is supported",
                conditions.len()
            ));
        }
        let Some(value) = conditions.get(pk_attribute) else {
            let attribute = conditions.keys().next().map_or("", String::as_str);
            return KeyLookup::Unsupported(format!(
                "condition on `{attribute}` is not the primary key `{pk_attribute}`"
            ));
        };
        match PrimaryKeyValue::from_value(value) {
            Some(pk) => KeyLookup::PrimaryKey(pk),
            None => KeyLookup::Unsupported(format!(
                "`{pk_attribute}` must be a non-empty string, number or boolean, got {value}"
            )),
        }
    }
}
