use lazy_static::lazy_static;
use sha3::{Digest, Keccak256};

/// A 32-byte state/node hash, opaque outside of the `Hasher` contract.
pub type Hash32 = [u8; 32];

/// The chain's hash function, treated as an oracle: this crate only needs
/// `hash(bytes) -> Hash32`, never the internals of Keccak-256 itself.
pub trait Hasher {
    fn hash(data: &[u8]) -> Hash32;
}

/// The chain's standard hash scheme.
pub struct Keccak256Hasher;

impl Hasher for Keccak256Hasher {
    fn hash(data: &[u8]) -> Hash32 {
        let mut hasher = Keccak256::new();
        hasher.update(data);
        hasher.finalize().into()
    }
}

lazy_static! {
    /// keccak(empty byte string) — the well-known hash of the empty code.
    pub static ref EMPTY_CODE_HASH: Hash32 = Keccak256Hasher::hash(&[]);

    /// The hash of an empty node, per the chain's convention (keccak of the
    /// RLP encoding of the empty string, `0x80`).
    pub static ref EMPTY_NODE_HASH: Hash32 = Keccak256Hasher::hash(&[0x80]);
}

/// A node's retained hash: either known (clean, safe to persist) or dirty
/// (computed lazily from content, must not be serialized as-is).
///
/// Mirrors the on-load semantics of §4.2: whichever half of a
/// branch/extension record a chosen [`HashLayout`](crate::HashLayout)
/// doesn't store on disk comes back dirty until recomputed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashSlot {
    Known(Hash32),
    Dirty,
}

impl HashSlot {
    pub fn known(self) -> Option<Hash32> {
        match self {
            HashSlot::Known(hash) => Some(hash),
            HashSlot::Dirty => None,
        }
    }

    pub fn is_dirty(self) -> bool {
        matches!(self, HashSlot::Dirty)
    }
}

impl From<Hash32> for HashSlot {
    fn from(hash: Hash32) -> Self {
        HashSlot::Known(hash)
    }
}

impl Default for HashSlot {
    fn default() -> Self {
        HashSlot::Dirty
    }
}
