//! Glob-style key patterns for [`keys_matching`](crate::StorageBackend::keys_matching).
//!
//! The syntax follows the usual key-value server conventions:
//!
//! | Token | Matches |
//! |-------|---------|
//! | `*` | any run of bytes, including none |
//! | `?` | exactly one byte |
//! | `[abc]`, `[a-z]`, `[^a]` | one byte from (or not from) the class |
//! | `\x` | the literal byte `x` |
//!
//! An unterminated `[` is treated as a literal.

/// Bytes that carry meaning inside a pattern.
pub const GLOB_METACHARACTERS: &[u8] = b"*?[]\\";

/// Returns `true` if `key` matches `pattern` in full.
///
/// ```
/// use keyrecord_storage::pattern::glob_match;
///
/// assert!(glob_match(b"user:*", b"user:42"));
/// assert!(!glob_match(b"user:?", b"user:42"));
/// ```
#[must_use]
pub fn glob_match(pattern: &[u8], key: &[u8]) -> bool {
    let (mut p, mut k) = (0, 0);
    // Position of the most recent `*` and the key offset it currently absorbs up to.
    let mut star: Option<(usize, usize)> = None;

    while k < key.len() {
        if pattern.get(p) == Some(&b'*') {
            star = Some((p, k));
            p += 1;
            continue;
        }
        if p < pattern.len()
            && let Some(next) = step(pattern, p, key[k])
        {
            p = next;
            k += 1;
            continue;
        }
        match star {
            Some((star_p, star_k)) => {
                p = star_p + 1;
                k = star_k + 1;
                star = Some((star_p, star_k + 1));
            },
            None => return false,
        }
    }

    pattern[p..].iter().all(|&b| b == b'*')
}

/// Escapes every metacharacter in `literal` so the result only matches itself.
#[must_use]
pub fn escape(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for ch in literal.chars() {
        if ch.is_ascii() && GLOB_METACHARACTERS.contains(&(ch as u8)) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Matches the single-byte token at `p` against `byte`, returning the index of
/// the next token on success.
fn step(pattern: &[u8], p: usize, byte: u8) -> Option<usize> {
    match pattern[p] {
        b'?' => Some(p + 1),
        b'\\' if p + 1 < pattern.len() => (pattern[p + 1] == byte).then_some(p + 2),
        b'[' => match class_match(pattern, p, byte) {
            Some((true, next)) => Some(next),
            Some((false, _)) => None,
            None => (byte == b'[').then_some(p + 1),
        },
        literal => (literal == byte).then_some(p + 1),
    }
}

/// Evaluates the class opening at `open`. `None` means the class is unterminated.
fn class_match(pattern: &[u8], open: usize, byte: u8) -> Option<(bool, usize)> {
    let mut i = open + 1;
    let negate = pattern.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    while i < pattern.len() {
        match pattern[i] {
            b']' => return Some((matched != negate, i + 1)),
            b'\\' if i + 1 < pattern.len() => {
                matched |= pattern[i + 1] == byte;
                i += 2;
            },
            lo if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' => {
                let hi = pattern[i + 2];
                let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
                matched |= (lo..=hi).contains(&byte);
                i += 3;
            },
            literal => {
                matched |= literal == byte;
                i += 1;
            },
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::exact(b"abc".as_slice(), b"abc".as_slice(), true)]
    #[case::star_suffix(b"user:*", b"user:", true)]
    #[case::star_middle(b"a*c", b"abbbc", true)]
    #[case::star_backtracks(b"*:id:*", b"x:id:y:id:z", true)]
    #[case::question(b"k?y", b"key", true)]
    #[case::question_needs_byte(b"k?", b"k", false)]
    #[case::class(b"[abc]1", b"b1", true)]
    #[case::class_miss(b"[abc]1", b"d1", false)]
    #[case::range(b"v[0-9]", b"v7", true)]
    #[case::negated(b"v[^0-9]", b"v7", false)]
    #[case::escaped_star(b"a\\*", b"a*", true)]
    #[case::escaped_star_is_literal(b"a\\*", b"ab", false)]
    #[case::unterminated_class(b"a[b", b"a[b", true)]
    #[case::prefix_only(b"user:", b"user:1", false)]
    #[case::empty_pattern(b"", b"", true)]
    fn matches(#[case] pattern: &[u8], #[case] key: &[u8], #[case] expected: bool) {
        assert_eq!(glob_match(pattern, key), expected);
    }

    #[test]
    fn escape_neutralizes_metacharacters() {
        assert_eq!(escape("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\");
        assert_eq!(escape("plain:key"), "plain:key");
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            /// An escaped literal matches exactly itself.
            #[test]
            fn escaped_literal_matches_itself(literal in "[ -~]{0,24}") {
                let pattern = escape(&literal);
                prop_assert!(glob_match(pattern.as_bytes(), literal.as_bytes()));
            }

            /// An escaped prefix followed by `*` matches every extension of it.
            #[test]
            fn escaped_prefix_matches_extensions(
                prefix in "[ -~]{0,16}",
                suffix in "[ -~]{0,16}",
            ) {
                let pattern = format!("{}*", escape(&prefix));
                let key = format!("{prefix}{suffix}");
                prop_assert!(glob_match(pattern.as_bytes(), key.as_bytes()));
            }
        }
    }
}
