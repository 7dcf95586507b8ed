//! Collection schemas and the coercions applied to stored records.
//!
//! A schema names each attribute's type and marks at most one attribute as
//! the primary key. Records read back from storage are passed through
//! [`CollectionSchema::parse`], which coerces values towards their declared
//! type. Coercion is lenient: a value that cannot be converted is returned
//! unchanged rather than rejected.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::{
    error::{AdapterError, AdapterResult},
    record::Record,
};

/// Primary-key attribute used when no attribute is flagged.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Declared type of an attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    #[default]
    String,
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Json,
    Array,
}

/// Definition of a single attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    /// Declared type.
    #[serde(rename = "type", default)]
    pub attribute_type: AttributeType,
    /// Whether this attribute is the collection's primary key.
    #[serde(default, alias = "primaryKey", skip_serializing_if = "is_false")]
    pub primary_key: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl AttributeDefinition {
    /// An attribute of the given type.
    #[must_use]
    pub fn new(attribute_type: AttributeType) -> Self {
        Self { attribute_type, primary_key: false }
    }

    /// Marks the attribute as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// The registered description of a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionSchema {
    /// Attribute definitions by name.
    pub attributes: BTreeMap<String, AttributeDefinition>,
}

impl<S: Into<String>> FromIterator<(S, AttributeDefinition)> for CollectionSchema {
    fn from_iter<I: IntoIterator<Item = (S, AttributeDefinition)>>(iter: I) -> Self {
        Self { attributes: iter.into_iter().map(|(name, def)| (name.into(), def)).collect() }
    }
}

impl CollectionSchema {
    /// Returns `true` if no attribute is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// The primary-key attribute: the first flagged one, else [`DEFAULT_PRIMARY_KEY`].
    #[must_use]
    pub fn primary_key(&self) -> &str {
        self.attributes
            .iter()
            .find(|(_, def)| def.primary_key)
            .map_or(DEFAULT_PRIMARY_KEY, |(name, _)| name.as_str())
    }

    /// Checks that the schema can address records.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::InvalidSchema`] if more than one attribute is
    /// flagged as primary key, or the primary key is declared as `json` or
    /// `array`.
    pub fn validate(&self, collection: &str) -> AdapterResult<()> {
        let flagged: Vec<&str> = self
            .attributes
            .iter()
            .filter(|(_, def)| def.primary_key)
            .map(|(name, _)| name.as_str())
            .collect();
        if flagged.len() > 1 {
            return Err(AdapterError::InvalidSchema {
                collection: collection.to_owned(),
                reason: format!("multiple primary keys: {}", flagged.join(", ")),
            });
        }
        if let Some(def) = self.attributes.get(self.primary_key())
            && matches!(def.attribute_type, AttributeType::Json | AttributeType::Array)
        {
            return Err(AdapterError::InvalidSchema {
                collection: collection.to_owned(),
                reason: format!("primary key `{}` must be a scalar type", self.primary_key()),
            });
        }
        Ok(())
    }

    /// Coerces every declared attribute of `record` to its type.
    #[must_use]
    pub fn parse(&self, mut record: Record) -> Record {
        for (name, value) in &mut record {
            if let Some(def) = self.attributes.get(name) {
                let raw = std::mem::take(value);
                *value = coerce(def.attribute_type, raw);
            }
        }
        record
    }
}

/// Coerces `value` towards `ty`, returning it unchanged when no conversion applies.
#[must_use]
pub fn coerce(ty: AttributeType, value: Value) -> Value {
    match (ty, value) {
        (_, Value::Null) => Value::Null,

        (AttributeType::String | AttributeType::Text, Value::Number(n)) => {
            Value::String(n.to_string())
        },
        (AttributeType::String | AttributeType::Text, Value::Bool(b)) => {
            Value::String(b.to_string())
        },

        (AttributeType::Integer, Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(i) => Value::from(i),
            Err(_) => match s.trim().parse::<f64>() {
                Ok(f) => integral(f).map_or(Value::String(s), Value::from),
                Err(_) => Value::String(s),
            },
        },
        (AttributeType::Integer, Value::Number(n)) if n.is_f64() => {
            match n.as_f64().and_then(integral) {
                Some(i) => Value::from(i),
                None => Value::Number(n),
            }
        },

        (AttributeType::Float, Value::String(s)) => {
            match s.trim().parse::<f64>().ok().and_then(Number::from_f64) {
                Some(n) => Value::Number(n),
                None => Value::String(s),
            }
        },

        (AttributeType::Boolean, Value::String(s)) => match s.trim() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(s),
        },
        (AttributeType::Boolean, Value::Number(n)) => match n.as_i64() {
            Some(0) => Value::Bool(false),
            Some(1) => Value::Bool(true),
            _ => Value::Number(n),
        },

        (AttributeType::DateTime, Value::String(s)) => {
            parse_datetime(&s).map_or(Value::String(s), |dt| {
                Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            })
        },
        (AttributeType::Date, Value::String(s)) => match parse_date(&s) {
            Some(date) => Value::String(date.format("%Y-%m-%d").to_string()),
            None => Value::String(s),
        },

        (_, other) => other,
    }
}

pub(crate) fn integral(f: f64) -> Option<i64> {
    // 2^63 is exactly representable; anything at or beyond it overflows i64.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    (f.is_finite() && f.fract() == 0.0 && f >= -LIMIT && f < LIMIT).then(|| f as i64)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .ok()
        .or_else(|| parse_datetime(s).map(|dt| dt.date_naive()))
}
