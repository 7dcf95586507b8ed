//! Records, primary-key values and time-to-live extraction.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::{
    error::{AdapterError, AdapterResult},
    schema::integral,
};

/// A record: attribute name to JSON value.
pub type Record = Map<String, Value>;

/// TTL value meaning "never expires".
pub const NO_EXPIRY_SENTINEL: f64 = -1.0;

/// A present, scalar primary-key value.
///
/// Only non-empty strings, numbers and booleans qualify. Null, empty strings,
/// arrays and objects cannot address a record.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryKeyValue(Value);

impl PrimaryKeyValue {
    /// Wraps `value` if it can serve as a primary key.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(value.clone())),
            Value::Number(_) | Value::Bool(_) => Some(Self(value.clone())),
            _ => None,
        }
    }

    /// The text embedded in the storage key. Strings are used verbatim;
    /// numbers and booleans use their JSON rendering, so `1` and `"1"` share
    /// a key. Integral floats render as integers, so `1.0` shares it too.
    #[must_use]
    pub fn key_segment(&self) -> String {
        match &self.0 {
            Value::String(s) => s.clone(),
            Value::Number(n) if n.is_f64() => match n.as_f64().and_then(integral) {
                Some(i) => i.to_string(),
                None => n.to_string(),
            },
            other => other.to_string(),
        }
    }

    /// Two values address the same record when their key segments agree.
    #[must_use]
    pub fn addresses_same_record(&self, other: &Self) -> bool {
        self.key_segment() == other.key_segment()
    }
}

/// How a record should be written with respect to expiry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expiry {
    /// Plain write, no expiry.
    Never,
    /// Expire after the given duration.
    After(Duration),
}

/// Reads the TTL attribute of `record`.
///
/// The attribute is coerced to a number the lenient way: numbers as they are,
/// numeric strings parsed, `true` as one, anything else as zero. Zero, NaN
/// and `-1` mean no expiry.
///
/// # Errors
///
/// Returns [`AdapterError::InvalidTtl`] for infinite values and for negative
/// values other than `-1`.
pub fn ttl_of(record: &Record, ttl_attribute: &str) -> AdapterResult<Expiry> {
    let Some(raw) = record.get(ttl_attribute) else {
        return Ok(Expiry::Never);
    };

    let seconds = match raw {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        Value::Bool(true) => 1.0,
        _ => 0.0,
    };

    if seconds.is_nan() || seconds == 0.0 || seconds == NO_EXPIRY_SENTINEL {
        return Ok(Expiry::Never);
    }
    if seconds < 0.0 || !seconds.is_finite() {
        return Err(AdapterError::InvalidTtl { value: raw.to_string() });
    }
    Duration::try_from_secs_f64(seconds)
        .map(Expiry::After)
        .map_err(|_| AdapterError::InvalidTtl { value: raw.to_string() })
}

/// Shallow merge: attributes of `values` overwrite those of `base`.
#[must_use]
pub fn merge(mut base: Record, values: &Record) -> Record {
    for (attribute, value) in values {
        base.insert(attribute.clone(), value.clone());
    }
    base
}
