//! Canonical form and content hash of an attribute set.
//!
//! Two attribute sets describe the same combination if, and only if, their hashes are equal. Entries with an empty key
//! or value are dropped before hashing, so `{color: red, size: ""}` and `{color: red}` are the same combination.
use blake2::{digest::consts::U32, Blake2b, Digest};

use crate::db_types::{Attributes, AttributesHash};

type Blake2b256 = Blake2b<U32>;

/// Drops entries with an empty (or whitespace-only) key or value and trims the rest.
pub fn normalize_attributes(attributes: &Attributes) -> Attributes {
    attributes
        .iter()
        .map(|(k, v)| (k.trim(), v.trim()))
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .collect()
}

/// The BLAKE2b-256 hash of the canonical JSON serialization of the normalized attributes, hex encoded.
pub fn attributes_hash(attributes: &Attributes) -> AttributesHash {
    let normalized = normalize_attributes(attributes);
    // Attributes is backed by a BTreeMap, so keys serialize in lexicographic order
    let canonical = serde_json::to_string(&normalized).unwrap_or_default();
    let digest = Blake2b256::digest(canonical.as_bytes());
    AttributesHash(digest.iter().map(|b| format!("{b:02x}")).collect())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hash_ignores_key_order() {
        let a: Attributes = vec![("size", "L"), ("color", "red"), ("fit", "slim")].into_iter().collect();
        let b: Attributes = vec![("fit", "slim"), ("color", "red"), ("size", "L")].into_iter().collect();
        assert_eq!(attributes_hash(&a), attributes_hash(&b));
    }

    #[test]
    fn hash_ignores_empty_entries() {
        let a = Attributes::new().with("color", "red");
        let b = Attributes::new().with("color", "red").with("size", "").with("", "x").with("fit", "  ");
        assert_eq!(attributes_hash(&a), attributes_hash(&b));
        assert_eq!(normalize_attributes(&b), a);
    }

    #[test]
    fn different_combinations_hash_differently() {
        let a = Attributes::new().with("color", "red");
        let b = Attributes::new().with("color", "blue");
        let c = Attributes::new().with("color", "red").with("size", "L");
        assert_ne!(attributes_hash(&a), attributes_hash(&b));
        assert_ne!(attributes_hash(&a), attributes_hash(&c));
        assert_eq!(attributes_hash(&a).as_str().len(), 64);
    }

    #[test]
    fn empty_set_has_a_stable_hash() {
        let empty = attributes_hash(&Attributes::new());
        let only_blanks = attributes_hash(&Attributes::new().with("a", ""));
        assert_eq!(empty, only_blanks);
    }
}
