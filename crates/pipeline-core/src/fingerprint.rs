//! Content-hash fingerprints used for cache keys and `upstream_fingerprint`.
//!
//! Cache keys must include upstream artifact fingerprints and an algorithm
//! version string per spec.md §9 — a silently stale cache is a correctness
//! bug, not a performance detail.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Fingerprint a serializable value via its canonical (sorted-key) JSON
/// encoding, so field reordering in a struct definition does not change the
/// hash.
pub fn fingerprint<T: Serialize>(value: &T) -> String {
    let canonical = serde_json::to_value(value)
        .map(|v| serde_json::to_string(&sort_keys(&v)).unwrap_or_default())
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build a cache key from an upstream fingerprint, free-form parameters, and
/// an algorithm version string. Any change to any component invalidates the
/// cache entry.
pub fn cache_key(upstream_fingerprint: &str, params_fingerprint: &str, algorithm_version: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(upstream_fingerprint.as_bytes());
    hasher.update(b"|");
    hasher.update(params_fingerprint.as_bytes());
    hasher.update(b"|");
    hasher.update(algorithm_version.as_bytes());
    hex::encode(hasher.finalize())
}

fn sort_keys(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for k in keys {
                sorted.insert(k.clone(), sort_keys(&map[k]));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Minimal hex encoding, avoiding a separate `hex` crate dependency for a
/// single call site.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct A {
        x: u32,
        y: u32,
    }

    #[derive(Serialize)]
    struct B {
        y: u32,
        x: u32,
    }

    #[test]
    fn field_order_does_not_change_fingerprint() {
        let a = fingerprint(&A { x: 1, y: 2 });
        let b = fingerprint(&B { y: 2, x: 1 });
        assert_eq!(a, b);
    }

    #[test]
    fn different_values_fingerprint_differently() {
        let a = fingerprint(&A { x: 1, y: 2 });
        let b = fingerprint(&A { x: 1, y: 3 });
        assert_ne!(a, b);
    }

    #[test]
    fn cache_key_changes_with_algorithm_version() {
        let k1 = cache_key("up", "params", "v1");
        let k2 = cache_key("up", "params", "v2");
        assert_ne!(k1, k2);
    }
}
