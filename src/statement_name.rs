//! Stable statement names derived from flattened SQL text.
//!
//! Names are memoized for the lifetime of the process and never evicted, so
//! memory grows with the number of distinct statement texts ever issued.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

const PREFIX_LEN: usize = 50;
const SUFFIX_LEN: usize = 13;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

type NameCache = LazyLock<Mutex<HashMap<String, Arc<str>>>>;

static NAMES: NameCache = LazyLock::new(|| Mutex::new(HashMap::new()));

/// Name for `text`: an identifier-safe prefix plus a hash suffix, at most 63 bytes.
///
/// Repeated calls with identical text return the same cached `Arc`.
/// Distinct texts are not guaranteed distinct names; collisions need a 64-bit hash collision
/// on texts that also share their first 50 characters.
#[must_use]
pub fn statement_name(text: &str) -> Arc<str> {
    let mut names = match NAMES.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(name) = names.get(text) {
        return Arc::clone(name);
    }
    let name: Arc<str> = Arc::from(derive_name(text));
    names.insert(text.to_string(), Arc::clone(&name));
    name
}

/// Number of memoized statement names.
#[must_use]
pub fn cached_statement_count() -> usize {
    match NAMES.lock() {
        Ok(guard) => guard.len(),
        Err(poisoned) => poisoned.into_inner().len(),
    }
}

fn derive_name(text: &str) -> String {
    let mut name: String = text
        .chars()
        .take(PREFIX_LEN)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    name.push_str(&base36(fnv1a(text.as_bytes())));
    name
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Fixed-width base-36; `u64::MAX` needs exactly 13 digits.
fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut buf = [b'0'; SUFFIX_LEN];
    for slot in buf.iter_mut().rev() {
        *slot = DIGITS[(n % 36) as usize];
        n /= 36;
    }
    buf.iter().map(|b| char::from(*b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_returns_cached_name() {
        let a = statement_name("SELECT $1 FROM t");
        let b = statement_name("SELECT $1 FROM t");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn names_are_identifier_safe_and_bounded() {
        let long = format!("SELECT * FROM t WHERE x = $1 AND note = 'ü' {}", "x".repeat(500));
        let name = statement_name(&long);
        assert!(name.len() <= 63);
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        assert!(name.starts_with("SELECT___FROM_t_WHERE_x____1_AND_note_____"));
    }

    #[test]
    fn shared_prefix_still_differs() {
        let base = "x".repeat(60);
        let a = statement_name(&format!("{base}a"));
        let b = statement_name(&format!("{base}b"));
        assert_ne!(a, b);
        assert_eq!(a[..PREFIX_LEN], b[..PREFIX_LEN]);
    }

    #[test]
    fn base36_is_fixed_width() {
        assert_eq!(base36(0), "0000000000000");
        assert_eq!(base36(35), "000000000000z");
        assert_eq!(base36(u64::MAX), "3w5e11264sgsf");
    }

    #[test]
    fn cache_grows_with_distinct_text() {
        let before = cached_statement_count();
        let _ = statement_name("SELECT 'cache_grows_with_distinct_text'");
        assert!(cached_statement_count() > before);
    }
}
