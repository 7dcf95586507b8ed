//! Shared test utilities for storage backend testing.
//!
//! Feature-gated behind `testutil` so none of it leaks into production
//! builds. Enable it from a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! keyrecord-storage = { path = "../storage", features = ["testutil"] }
//! ```

/// Create a deterministic test key from a prefix and index.
///
/// Produces keys like `"prefix:000042"` (zero-padded to 6 digits) so that
/// byte order matches numeric order in pattern-scan results.
#[must_use]
pub fn make_key(prefix: &str, idx: usize) -> Vec<u8> {
    format!("{prefix}:{idx:06}").into_bytes()
}

/// Assert that a [`StorageResult`](crate::StorageResult) is an error of the given variant.
///
/// ```no_run
/// use keyrecord_storage::{StorageError, StorageResult, assert_storage_error};
///
/// let result: StorageResult<()> = Err(StorageError::not_found("missing"));
/// assert_storage_error!(result, NotFound);
/// ```
#[macro_export]
macro_rules! assert_storage_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::$variant { .. })),
            "expected StorageError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
}

/// Assert that a [`StorageResult`](crate::StorageResult) is `Ok`, returning the inner value.
#[macro_export]
macro_rules! assert_storage_ok {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("expected Ok, got StorageError: {e:?}"),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("{}: expected Ok, got StorageError: {e:?}", $msg),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StorageError, StorageResult};

    #[test]
    fn test_make_key_format() {
        assert_eq!(make_key("test", 42), b"test:000042");
    }

    #[test]
    fn test_make_key_ordering() {
        assert!(make_key("k", 1) < make_key("k", 10));
        assert!(make_key("k", 10) < make_key("k", 100));
    }

    #[test]
    fn test_assert_storage_error_macro() {
        let result: StorageResult<()> = Err(StorageError::not_found("missing"));
        assert_storage_error!(result, NotFound);
    }

    #[test]
    fn test_assert_storage_ok_macro() {
        let result: StorageResult<i32> = Ok(42);
        assert_eq!(assert_storage_ok!(result), 42);
    }
}
