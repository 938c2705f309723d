//! Content hashing for the trie the builder assembles.
//!
//! The chain's real state-root hash (RLP plus Keccak-256 over the encoded
//! node) is an oracle this workspace never re-derives (§1's explicit
//! non-goal). What the builder needs instead is *a* deterministic,
//! structural hash over each node's logical content so that two builders
//! fed the same leaves produce the same root — which is all the
//! self-verifying round trip in §4.4/§4.5 actually checks.

use trie_node::{AccountInfo, Hash32, Hasher, Keccak256Hasher, NibblePath, EMPTY_NODE_HASH};

pub fn hash_value(key: &[u8; 32], value: &[u8; 32]) -> Hash32 {
    let mut buf = Vec::with_capacity(65);
    buf.push(b'v');
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    Keccak256Hasher::hash(&buf)
}

pub fn hash_account(info: &AccountInfo, storage_hash: Hash32) -> Hash32 {
    let mut buf = Vec::with_capacity(1 + 8 + 32 + 32 + 32);
    buf.push(b'a');
    buf.extend_from_slice(&info.nonce.to_be_bytes());
    buf.extend_from_slice(&info.balance);
    buf.extend_from_slice(&info.code_hash);
    buf.extend_from_slice(&storage_hash);
    Keccak256Hasher::hash(&buf)
}

pub fn hash_branch(child_hashes: &[Hash32; 16]) -> Hash32 {
    let mut buf = Vec::with_capacity(1 + 16 * 32);
    buf.push(b'b');
    for hash in child_hashes {
        buf.extend_from_slice(hash);
    }
    Keccak256Hasher::hash(&buf)
}

pub fn hash_extension(prefix: &NibblePath, child_hash: Hash32) -> Hash32 {
    let mut buf = Vec::with_capacity(1 + PACKED + 32);
    buf.push(b'e');
    buf.extend_from_slice(&prefix.to_fixed_bytes());
    buf.extend_from_slice(&child_hash);
    Keccak256Hasher::hash(&buf)
}

const PACKED: usize = trie_node::PACKED_PATH_SIZE;

pub fn empty_hash() -> Hash32 {
    *EMPTY_NODE_HASH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_content_hashes_the_same() {
        let a = hash_value(&[1u8; 32], &[2u8; 32]);
        let b = hash_value(&[1u8; 32], &[2u8; 32]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_tags_do_not_collide_trivially() {
        let value_hash = hash_value(&[0u8; 32], &[0u8; 32]);
        let branch_hash = hash_branch(&[[0u8; 32]; 16]);
        assert_ne!(value_hash, branch_hash);
    }
}
