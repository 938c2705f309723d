use std::collections::BTreeMap;

use trie_node::{Hash32, Hasher, Keccak256Hasher, EMPTY_CODE_HASH};

/// A `{code_hash -> bytes}` mapping, always iterated in ascending hash
/// order. Backed by a `BTreeMap` so "serialize in ascending hash order"
/// falls out of the natural iteration order rather than a sort step.
#[derive(Clone, Debug, Default)]
pub struct CodeDictionary {
    by_hash: BTreeMap<Hash32, Vec<u8>>,
}

impl CodeDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh dictionary seeded with the well-known empty-code entry, as
    /// every import starts with.
    pub fn seeded() -> Self {
        let mut dict = Self::new();
        dict.by_hash.insert(*EMPTY_CODE_HASH, Vec::new());
        dict
    }

    pub fn insert(&mut self, bytes: Vec<u8>) -> Hash32 {
        let hash = Keccak256Hasher::hash(&bytes);
        self.by_hash.insert(hash, bytes);
        hash
    }

    pub fn insert_with_hash(&mut self, hash: Hash32, bytes: Vec<u8>) {
        self.by_hash.insert(hash, bytes);
    }

    pub fn contains(&self, hash: &Hash32) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash32) -> Option<&[u8]> {
        self.by_hash.get(hash).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    /// Entries in ascending hash order, the order the wire formats require.
    pub fn iter_sorted(&self) -> impl Iterator<Item = (&Hash32, &Vec<u8>)> {
        self.by_hash.iter()
    }
}

/// Resolves a code hash to its bytes, backing the pruning visit that
/// collects codes referenced by account nodes during export. Implemented
/// by whatever durably stores bytecode outside the trie itself.
pub trait CodeResolver {
    fn resolve(&self, hash: &Hash32) -> Option<Vec<u8>>;
}

impl CodeResolver for CodeDictionary {
    fn resolve(&self, hash: &Hash32) -> Option<Vec<u8>> {
        self.get(hash).map(|bytes| bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterates_in_ascending_hash_order() {
        let mut dict = CodeDictionary::new();
        dict.insert(b"alpha".to_vec());
        dict.insert(b"beta".to_vec());
        dict.insert(b"gamma".to_vec());

        let hashes: Vec<Hash32> = dict.iter_sorted().map(|(h, _)| *h).collect();
        let mut sorted = hashes.clone();
        sorted.sort();
        assert_eq!(hashes, sorted);
    }

    #[test]
    fn seeded_dictionary_contains_the_empty_code_hash() {
        let dict = CodeDictionary::seeded();
        assert!(dict.contains(&EMPTY_CODE_HASH));
        assert_eq!(dict.get(&EMPTY_CODE_HASH), Some(&[][..]));
    }

    #[test]
    fn insert_keys_by_keccak_of_the_bytes() {
        let mut dict = CodeDictionary::new();
        let hash = dict.insert(b"some_code".to_vec());
        assert_eq!(dict.get(&hash), Some(&b"some_code"[..]));
    }
}
