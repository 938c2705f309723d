use crate::{
    error::NodeError, hash::Hash32, config::HashLayout, id::{NodeId, Variant}, path::{NibblePath, PACKED_PATH_SIZE},
    HashSlot, EMPTY_CODE_HASH,
};

pub const NODE_ID_SIZE: usize = 6;
const HASH_SIZE: usize = 32;

/// `address(20) | nonce(8) | balance(32) | code_hash(32) | storage_root(6) | suffix_len(1)`
pub const ACCOUNT_RECORD_SIZE: usize = 20 + 8 + 32 + 32 + NODE_ID_SIZE + 1;
/// `key(32) | value(32) | suffix_len(1)`
pub const VALUE_RECORD_SIZE: usize = 32 + 32 + 1;

/// A tagged union over the five node variants. `Empty` is the singleton
/// carried by [`NodeId::EMPTY`] and is never itself stored in a container.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Empty,
    Branch(BranchNode),
    Extension(ExtensionNode),
    Account(AccountNode),
    Value(ValueNode),
}

impl Node {
    pub fn variant(&self) -> Variant {
        match self {
            Node::Empty => Variant::Empty,
            Node::Branch(_) => Variant::Branch,
            Node::Extension(_) => Variant::Extension,
            Node::Account(_) => Variant::Account,
            Node::Value(_) => Variant::Value,
        }
    }
}

/// 16 typed children, their hashes, and the embedded-child bitmap.
///
/// At least two children must be non-empty (§3 invariant) — `validate`
/// enforces this at construction and decode time, the way the teacher's
/// grid cells track touched/after bitmaps (`grid/bitmap.rs`) rather than
/// re-deriving child counts on every access.
#[derive(Clone, Debug, PartialEq)]
pub struct BranchNode {
    pub children: [NodeId; 16],
    pub child_hashes: [HashSlot; 16],
    pub own_hash: HashSlot,
    /// Bit `i` set means child `i` is embedded (RLP-short enough to inline)
    /// rather than referenced by hash.
    pub embedded_mask: u16,
}

impl BranchNode {
    pub const EMPTY_CHILDREN: [NodeId; 16] = [NodeId::EMPTY; 16];

    pub fn non_empty_children(&self) -> usize {
        self.children.iter().filter(|c| !c.is_empty()).count()
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        let count = self.non_empty_children();
        if count < 2 {
            return Err(NodeError::TooFewChildren(count));
        }
        Ok(())
    }

    fn encode_with_parent(&self) -> Result<Vec<u8>, NodeError> {
        self.validate()?;
        let own_hash = self.own_hash.known().ok_or(NodeError::DirtyHash)?;
        let mut buf = Vec::with_capacity(16 * NODE_ID_SIZE + HASH_SIZE);
        for child in &self.children {
            buf.extend_from_slice(&child.to_bytes());
        }
        buf.extend_from_slice(&own_hash);
        Ok(buf)
    }

    fn encode_with_child(&self) -> Result<Vec<u8>, NodeError> {
        self.validate()?;
        let mut buf = Vec::with_capacity(16 * NODE_ID_SIZE + 16 * HASH_SIZE + 2);
        for child in &self.children {
            buf.extend_from_slice(&child.to_bytes());
        }
        for (i, slot) in self.child_hashes.iter().enumerate() {
            if self.children[i].is_empty() {
                buf.extend_from_slice(&[0u8; HASH_SIZE]);
            } else {
                buf.extend_from_slice(&slot.known().ok_or(NodeError::DirtyHash)?);
            }
        }
        buf.extend_from_slice(&self.embedded_mask.to_be_bytes());
        Ok(buf)
    }

    pub fn encode(&self, layout: HashLayout) -> Result<Vec<u8>, NodeError> {
        match layout {
            HashLayout::WithParent => self.encode_with_parent(),
            HashLayout::WithChild => self.encode_with_child(),
        }
    }

    pub fn decode(bytes: &[u8], layout: HashLayout) -> Result<Self, NodeError> {
        let mut children = [NodeId::EMPTY; 16];
        for (i, chunk) in bytes[..16 * NODE_ID_SIZE].chunks(NODE_ID_SIZE).enumerate() {
            children[i] = NodeId::from_slice(chunk)?;
        }
        let node = match layout {
            HashLayout::WithParent => {
                let mut own = [0u8; HASH_SIZE];
                own.copy_from_slice(&bytes[16 * NODE_ID_SIZE..16 * NODE_ID_SIZE + HASH_SIZE]);
                BranchNode {
                    children,
                    // Child hashes are reconstructed lazily: every non-empty
                    // child comes back dirty, exactly as §4.2 specifies.
                    child_hashes: children.map(|c| {
                        if c.is_empty() {
                            HashSlot::Known([0u8; 32])
                        } else {
                            HashSlot::Dirty
                        }
                    }),
                    own_hash: HashSlot::Known(own),
                    embedded_mask: 0,
                }
            }
            HashLayout::WithChild => {
                let mut child_hashes = [HashSlot::Dirty; 16];
                let hashes_start = 16 * NODE_ID_SIZE;
                for (i, chunk) in bytes[hashes_start..hashes_start + 16 * HASH_SIZE]
                    .chunks(HASH_SIZE)
                    .enumerate()
                {
                    let mut h = [0u8; HASH_SIZE];
                    h.copy_from_slice(chunk);
                    child_hashes[i] = if children[i].is_empty() {
                        HashSlot::Known([0u8; 32])
                    } else {
                        HashSlot::Known(h)
                    };
                }
                let mask_start = hashes_start + 16 * HASH_SIZE;
                let embedded_mask = u16::from_be_bytes([bytes[mask_start], bytes[mask_start + 1]]);
                BranchNode {
                    children,
                    child_hashes,
                    own_hash: HashSlot::Dirty,
                    embedded_mask,
                }
            }
        };
        node.validate()?;
        Ok(node)
    }
}

/// A path prefix compressing a run of single-child branches down to one
/// branch child.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtensionNode {
    pub prefix: NibblePath,
    pub child: NodeId,
    pub child_hash: HashSlot,
    pub own_hash: HashSlot,
    pub embedded: bool,
}

impl ExtensionNode {
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.prefix.is_empty() {
            return Err(NodeError::EmptyExtensionPrefix);
        }
        if self.child.variant() != Variant::Branch {
            return Err(NodeError::ExtensionChildNotBranch);
        }
        Ok(())
    }

    pub fn encode(&self, layout: HashLayout) -> Result<Vec<u8>, NodeError> {
        self.validate()?;
        let mut buf = Vec::with_capacity(PACKED_PATH_SIZE + NODE_ID_SIZE + HASH_SIZE + 1);
        buf.extend_from_slice(&self.prefix.to_fixed_bytes());
        buf.extend_from_slice(&self.child.to_bytes());
        match layout {
            HashLayout::WithParent => {
                buf.extend_from_slice(&self.own_hash.known().ok_or(NodeError::DirtyHash)?);
            }
            HashLayout::WithChild => {
                buf.extend_from_slice(&self.child_hash.known().ok_or(NodeError::DirtyHash)?);
                buf.push(self.embedded as u8);
            }
        }
        Ok(buf)
    }

    pub fn decode(bytes: &[u8], layout: HashLayout) -> Result<Self, NodeError> {
        let prefix = NibblePath::from_fixed_bytes(&bytes[..PACKED_PATH_SIZE])?;
        let mut cursor = PACKED_PATH_SIZE;
        let child = NodeId::from_slice(&bytes[cursor..cursor + NODE_ID_SIZE])?;
        cursor += NODE_ID_SIZE;
        let node = match layout {
            HashLayout::WithParent => {
                let mut own = [0u8; HASH_SIZE];
                own.copy_from_slice(&bytes[cursor..cursor + HASH_SIZE]);
                ExtensionNode {
                    prefix,
                    child,
                    child_hash: HashSlot::Dirty,
                    own_hash: HashSlot::Known(own),
                    embedded: false,
                }
            }
            HashLayout::WithChild => {
                let mut child_hash = [0u8; HASH_SIZE];
                child_hash.copy_from_slice(&bytes[cursor..cursor + HASH_SIZE]);
                let embedded = bytes[cursor + HASH_SIZE] != 0;
                ExtensionNode {
                    prefix,
                    child,
                    child_hash: HashSlot::Known(child_hash),
                    own_hash: HashSlot::Dirty,
                    embedded,
                }
            }
        };
        node.validate()?;
        Ok(node)
    }
}

/// `nonce`, `balance`, and `code_hash` — the account facts an MPT leaf
/// carries alongside the path to it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccountInfo {
    pub nonce: u64,
    pub balance: [u8; 32],
    pub code_hash: Hash32,
}

impl AccountInfo {
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance == [0u8; 32] && self.code_hash == *EMPTY_CODE_HASH
    }
}

/// An account leaf: partitions the upper address region of the trie from
/// the lower, per-account storage region.
#[derive(Clone, Debug, PartialEq)]
pub struct AccountNode {
    pub address: [u8; 20],
    pub info: AccountInfo,
    /// `NodeId::EMPTY` when the account has no storage.
    pub storage_root: NodeId,
    pub suffix_len: u8,
}

impl AccountNode {
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.info.is_empty() {
            return Err(NodeError::EmptyAccountInfo);
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, NodeError> {
        self.validate()?;
        let mut buf = Vec::with_capacity(ACCOUNT_RECORD_SIZE);
        buf.extend_from_slice(&self.address);
        buf.extend_from_slice(&self.info.nonce.to_be_bytes());
        buf.extend_from_slice(&self.info.balance);
        buf.extend_from_slice(&self.info.code_hash);
        buf.extend_from_slice(&self.storage_root.to_bytes());
        buf.push(self.suffix_len);
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, NodeError> {
        if bytes.len() != ACCOUNT_RECORD_SIZE {
            return Err(NodeError::Truncated {
                expected: ACCOUNT_RECORD_SIZE,
                got: bytes.len(),
            });
        }
        let mut address = [0u8; 20];
        address.copy_from_slice(&bytes[0..20]);
        let nonce = u64::from_be_bytes(bytes[20..28].try_into().unwrap());
        let mut balance = [0u8; 32];
        balance.copy_from_slice(&bytes[28..60]);
        let mut code_hash = [0u8; 32];
        code_hash.copy_from_slice(&bytes[60..92]);
        let storage_root = NodeId::from_slice(&bytes[92..98])?;
        let suffix_len = bytes[98];
        let node = AccountNode {
            address,
            info: AccountInfo {
                nonce,
                balance,
                code_hash,
            },
            storage_root,
            suffix_len,
        };
        node.validate()?;
        Ok(node)
    }
}

/// A storage-slot leaf, reachable only below exactly one account node.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueNode {
    pub key: [u8; 32],
    pub value: [u8; 32],
    pub suffix_len: u8,
}

impl ValueNode {
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.value == [0u8; 32] {
            return Err(NodeError::ZeroValue);
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, NodeError> {
        self.validate()?;
        let mut buf = Vec::with_capacity(VALUE_RECORD_SIZE);
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);
        buf.push(self.suffix_len);
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, NodeError> {
        if bytes.len() != VALUE_RECORD_SIZE {
            return Err(NodeError::Truncated {
                expected: VALUE_RECORD_SIZE,
                got: bytes.len(),
            });
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[0..32]);
        let mut value = [0u8; 32];
        value.copy_from_slice(&bytes[32..64]);
        let node = ValueNode {
            key,
            value,
            suffix_len: bytes[64],
        };
        node.validate()?;
        Ok(node)
    }
}

/// The fixed record size for a branch record under `layout`.
pub fn branch_record_size(layout: HashLayout) -> usize {
    match layout {
        HashLayout::WithParent => 16 * NODE_ID_SIZE + HASH_SIZE,
        HashLayout::WithChild => 16 * NODE_ID_SIZE + 16 * HASH_SIZE + 2,
    }
}

/// The fixed record size for an extension record under `layout`.
pub fn extension_record_size(layout: HashLayout) -> usize {
    match layout {
        HashLayout::WithParent => PACKED_PATH_SIZE + NODE_ID_SIZE + HASH_SIZE,
        HashLayout::WithChild => PACKED_PATH_SIZE + NODE_ID_SIZE + HASH_SIZE + 1,
    }
}
