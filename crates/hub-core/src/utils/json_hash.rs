//! Canonical JSON hashing used when comparing node payloads.
//!
//! Hashing walks the parsed value directly with [`AHasher`] instead of
//! serializing it back to text, and object keys are visited in sorted order so
//! two nodes that emit the same document with different key order agree.

use ahash::AHasher;
use serde_json::Value;
use std::hash::{BuildHasher, Hash, Hasher};

/// Fixed seeds so fingerprints are stable across processes and restarts.
const SEEDS: (u64, u64, u64, u64) =
    (0x243f_6a88_85a3_08d3, 0x1319_8a2e_0370_7344, 0xa409_3822_299f_31d0, 0x082e_fa98_ec4e_6c89);

/// Creates a hasher with the crate-wide fixed seeds.
#[must_use]
pub fn stable_hasher() -> AHasher {
    ahash::RandomState::with_seeds(SEEDS.0, SEEDS.1, SEEDS.2, SEEDS.3).build_hasher()
}

/// Feeds a JSON value into `hasher` with a per-type discriminant byte:
/// null 0, bool 1, number 2, string 3, array 4, object 5.
pub fn hash_json_value(value: &Value, hasher: &mut impl Hasher) {
    match value {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(b) => {
            1u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Number(n) => {
            2u8.hash(hasher);
            if let Some(i) = n.as_i64() {
                0u8.hash(hasher);
                i.hash(hasher);
            } else if let Some(u) = n.as_u64() {
                1u8.hash(hasher);
                u.hash(hasher);
            } else if let Some(f) = n.as_f64() {
                2u8.hash(hasher);
                let bits = if f.is_nan() { f64::NAN.to_bits() } else { f.to_bits() };
                bits.hash(hasher);
            }
        }
        Value::String(s) => {
            3u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Array(items) => {
            4u8.hash(hasher);
            items.len().hash(hasher);
            for item in items {
                hash_json_value(item, hasher);
            }
        }
        Value::Object(map) => {
            5u8.hash(hasher);
            map.len().hash(hasher);
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            for key in keys {
                key.hash(hasher);
                if let Some(inner) = map.get(key) {
                    hash_json_value(inner, hasher);
                }
            }
        }
    }
}

/// Fingerprint of a single JSON value.
#[must_use]
pub fn fingerprint(value: &Value) -> u64 {
    let mut hasher = stable_hasher();
    hash_json_value(value, &mut hasher);
    hasher.finish()
}

/// Order-independent fingerprint of a collection: the member fingerprints are
/// sorted before being combined, so `[a, b]` and `[b, a]` agree while `[a, a]`
/// and `[a]` do not.
#[must_use]
pub fn unordered_fingerprint<I>(members: I) -> u64
where
    I: IntoIterator<Item = u64>,
{
    let mut hashes: Vec<u64> = members.into_iter().collect();
    hashes.sort_unstable();
    let mut hasher = stable_hasher();
    hashes.len().hash(&mut hasher);
    for hash in hashes {
        hash.hash(&mut hasher);
    }
    hasher.finish()
}

/// Canonical fingerprint of a raw payload, or `None` if it is not JSON.
#[must_use]
pub fn fingerprint_bytes(bytes: &[u8]) -> Option<u64> {
    serde_json::from_slice::<Value>(bytes).ok().map(|value| fingerprint(&value))
}
