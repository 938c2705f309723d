//! The node model for the world-state trie: identifiers, the five node
//! variants, nibble paths, and their fixed-size on-disk encodings.
//!
//! Nothing in this crate touches a filesystem or spawns a thread; it only
//! describes the shape of a node and how to pack/unpack it. [`trie-source`]
//! reads these records off disk, [`trie-visitor`] walks them, and
//! [`trie-codec`] serializes them into the wire formats.

mod config;
mod error;
mod hash;
mod id;
mod node;
mod path;

pub use config::{HashLayout, PathHashing, TrieConfig};
pub use error::NodeError;
pub use hash::{Hash32, HashSlot, Hasher, Keccak256Hasher, EMPTY_CODE_HASH, EMPTY_NODE_HASH};
pub use id::{IdError, NodeId, Variant};
pub use node::{
    branch_record_size, extension_record_size, AccountInfo, AccountNode, BranchNode,
    ExtensionNode, Node, ValueNode, ACCOUNT_RECORD_SIZE, NODE_ID_SIZE, VALUE_RECORD_SIZE,
};
pub use path::{NibblePath, PathError, PACKED_PATH_SIZE};
