//! Runtime type identifiers
//!
//! Every concrete type that is ever boxed into an interface gets a 64-bit id;
//! the runtime compares these ids to test identity. Ids are FNV-1a hashes of
//! the printed type (base string followed by each dim token), assigned lazily
//! on first boxing and stable for the life of the translator.

use std::collections::BTreeMap;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(seed: u64, bytes: &[u8]) -> u64 {
    let mut h = seed;
    for &b in bytes {
        h ^= b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// Lazily-populated map from printed type to runtime id
#[derive(Debug, Default)]
pub struct TypeIds {
    ids: BTreeMap<String, u64>,
    taken: BTreeMap<u64, String>,
}

impl TypeIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id for a printed type, assigning one on first sight.
    ///
    /// Distinct keys always get distinct ids: on the (astronomically rare)
    /// hash collision the id is re-derived with a salt until it is free,
    /// which stays deterministic because population order is deterministic.
    pub fn id(&mut self, base: &str, dims: &[String]) -> u64 {
        let mut key = String::from(base);
        for d in dims {
            key.push('\u{1}');
            key.push_str(d);
        }
        if let Some(&id) = self.ids.get(&key) {
            return id;
        }
        let mut id = fnv1a(FNV_OFFSET, key.as_bytes());
        let mut salt = 0u8;
        while self.taken.contains_key(&id) {
            id = fnv1a(id, &[salt]);
            salt = salt.wrapping_add(1);
        }
        self.ids.insert(key.clone(), id);
        self.taken.insert(id, key);
        id
    }

    /// All assigned ids, keyed by printed type
    pub fn assigned(&self) -> impl Iterator<Item = (&str, u64)> {
        self.ids.iter().map(|(k, &v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_type_same_id() {
        let mut ids = TypeIds::new();
        let a = ids.id("int", &[]);
        let b = ids.id("int", &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn dims_distinguish_types() {
        let mut ids = TypeIds::new();
        let scalar = ids.id("int", &[]);
        let arr = ids.id("int", &["[4]".to_string()]);
        let arr2 = ids.id("int", &["[4]".to_string(), "[2]".to_string()]);
        assert_ne!(scalar, arr);
        assert_ne!(arr, arr2);
    }

    #[test]
    fn id_matches_reference_fnv() {
        // FNV-1a of "int"
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for b in b"int" {
            h ^= *b as u64;
            h = h.wrapping_mul(0x0000_0100_0000_01b3);
        }
        let mut ids = TypeIds::new();
        assert_eq!(ids.id("int", &[]), h);
    }
}
