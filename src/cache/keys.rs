//! Cache key construction and key patterns

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::error::{CacheError, CacheResult};
use crate::text::normalize;

/// Prefix of full-query result keys; such entries are admitted to L1
pub const SEARCH_KEY_PREFIX: &str = "search:";

/// Prefix of memoized query expansions
pub const EXPANSION_KEY_PREFIX: &str = "expansion:";

const OPTIONS_HASH_LENGTH: usize = 16;

/// `search:{normalized query}:{16 hex of sha256(canonical options JSON)}`
///
/// Only pass the options that change the result. Object keys are sorted
/// before hashing, so field order never changes the hash.
pub fn query_cache_key<O: Serialize>(query: &str, options: &O) -> CacheResult<String> {
    let canonical = canonicalize(serde_json::to_value(options)?);
    let digest = Sha256::digest(canonical.to_string().as_bytes());
    let hex: String = digest
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect();

    Ok(format!(
        "{}{}:{}",
        SEARCH_KEY_PREFIX,
        normalize(query),
        &hex[..OPTIONS_HASH_LENGTH]
    ))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// `expansion:{generation}:{mode}:{term}`
pub fn expansion_cache_key(generation: u64, mode: &str, term: &str) -> String {
    format!("{EXPANSION_KEY_PREFIX}{generation}:{mode}:{term}")
}

/// Compile a glob (`*` any run, `?` one character) into an anchored regex
pub fn glob_to_regex(pattern: &str) -> CacheResult<Regex> {
    let mut expression = String::with_capacity(pattern.len() + 8);
    expression.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expression.push_str(".*"),
            '?' => expression.push('.'),
            _ => expression.push_str(&regex::escape(&c.to_string())),
        }
    }
    expression.push('$');

    Regex::new(&expression).map_err(|e| CacheError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_key_shape() {
        let key = query_cache_key("  VSAM   Status ", &json!({"limit": 10})).unwrap();
        let (prefix, hash) = key.rsplit_once(':').unwrap();
        assert_eq!(prefix, "search:vsam status");
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_query_key_ignores_field_order() {
        let a = query_cache_key("vsam", &json!({"limit": 10, "fuzzy": true})).unwrap();
        let b = query_cache_key("vsam", &json!({"fuzzy": true, "limit": 10})).unwrap();
        let c = query_cache_key("vsam", &json!({"fuzzy": false, "limit": 10})).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_glob_patterns() {
        let re = glob_to_regex("search:vsam*").unwrap();
        assert!(re.is_match("search:vsam status:abc"));
        assert!(!re.is_match("expansion:1:fuzzy:vsam"));

        let re = glob_to_regex("k?y.1").unwrap();
        assert!(re.is_match("key.1"));
        assert!(!re.is_match("keyx1"));
    }

    #[test]
    fn test_expansion_key() {
        assert_eq!(expansion_cache_key(3, "fuzzy", "databse"), "expansion:3:fuzzy:databse");
    }
}
