//! Storage key derivation.
//!
//! A record lives at `{prefix}:{collection}:{pk_attribute}:{pk_value}`. Each
//! segment is percent-encoded so that `:` only ever appears as a separator
//! and no segment carries a glob metacharacter. The encoding is injective, so
//! distinct primary-key values always map to distinct keys, and the key of an
//! empty value is a literal prefix of every key in the collection.

use std::fmt::Write as _;

use keyrecord_storage::pattern::{self, GLOB_METACHARACTERS};

/// Separator between key segments.
pub const SEPARATOR: char = ':';

/// Builds the storage key of a record.
#[must_use]
pub fn record_key(prefix: &str, collection: &str, pk_attribute: &str, pk_value: &str) -> String {
    let mut key = String::with_capacity(
        prefix.len() + collection.len() + pk_attribute.len() + pk_value.len() + 3,
    );
    for (i, segment) in [prefix, collection, pk_attribute, pk_value].into_iter().enumerate() {
        if i > 0 {
            key.push(SEPARATOR);
        }
        sanitize_into(&mut key, segment);
    }
    key
}

/// Builds the glob pattern matching every key that starts with `key_prefix`.
///
/// Passing the record key of an empty primary-key value yields the pattern
/// of the whole collection.
#[must_use]
pub fn scan_pattern(key_prefix: &str) -> String {
    let mut pattern = pattern::escape(key_prefix);
    pattern.push('*');
    pattern
}

/// Percent-encodes the characters that are unsafe inside a key segment.
#[must_use]
pub fn sanitize(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    sanitize_into(&mut out, segment);
    out
}

fn sanitize_into(out: &mut String, segment: &str) {
    for ch in segment.chars() {
        if needs_encoding(ch) {
            let mut buf = [0u8; 4];
            for byte in ch.encode_utf8(&mut buf).bytes() {
                // Writing to a String cannot fail.
                let _ = write!(out, "%{byte:02X}");
            }
        } else {
            out.push(ch);
        }
    }
}

fn needs_encoding(ch: char) -> bool {
    ch == '%'
        || ch == SEPARATOR
        || ch.is_whitespace()
        || ch.is_control()
        || (ch.is_ascii() && GLOB_METACHARACTERS.contains(&(ch as u8)))
}
