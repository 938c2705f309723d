//! The minimal sorted-batch trie builder import needs.
//!
//! This is deliberately not a general mutable forest: it supports exactly
//! one operation, building a finished, fully-hashed trie from a sorted
//! batch of leaves. Grounded in the teacher's sorted-update construction
//! (`trie_sorted.rs`'s stack of in-progress branch nodes keyed by common
//! path prefix), reshaped here as a plain recursive bottom-up split since
//! import never mutates an existing trie in place — there is no streaming
//! write-queue to manage, only a finished batch to fold into nodes.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use trie_node::{
    branch_record_size, extension_record_size, AccountInfo, AccountNode, BranchNode,
    ExtensionNode, Hash32, HashLayout, HashSlot, NibblePath, NodeId, ValueNode,
};

use crate::error::Error;
use crate::hashing;

/// Owns the four append-only container files a fresh trie directory needs
/// and hands out identifiers in allocation order, exactly the grid of
/// parallel arenas §9 calls for.
pub struct ContainerWriter {
    hash_layout: HashLayout,
    accounts: File,
    branches: File,
    extensions: File,
    values: File,
    accounts_count: u64,
    branches_count: u64,
    extensions_count: u64,
    values_count: u64,
}

impl ContainerWriter {
    pub fn create(dir: &Path, hash_layout: HashLayout) -> Result<Self, Error> {
        let open = |name: &str| -> Result<File, Error> {
            let sub = dir.join(name);
            fs::create_dir_all(&sub)?;
            Ok(File::create(sub.join("values.dat"))?)
        };
        Ok(Self {
            hash_layout,
            accounts: open("accounts")?,
            branches: open("branches")?,
            extensions: open("extensions")?,
            values: open("values")?,
            accounts_count: 0,
            branches_count: 0,
            extensions_count: 0,
            values_count: 0,
        })
    }

    pub fn write_value(&mut self, node: ValueNode) -> Result<NodeId, Error> {
        let bytes = node.encode()?;
        self.values.write_all(&bytes)?;
        let id = NodeId::new(trie_node::Variant::Value, self.values_count)?;
        self.values_count += 1;
        Ok(id)
    }

    pub fn write_account(&mut self, node: AccountNode) -> Result<NodeId, Error> {
        let bytes = node.encode()?;
        self.accounts.write_all(&bytes)?;
        let id = NodeId::new(trie_node::Variant::Account, self.accounts_count)?;
        self.accounts_count += 1;
        Ok(id)
    }

    pub fn write_branch(&mut self, node: BranchNode) -> Result<NodeId, Error> {
        let bytes = node.encode(self.hash_layout)?;
        debug_assert_eq!(bytes.len(), branch_record_size(self.hash_layout));
        self.branches.write_all(&bytes)?;
        let id = NodeId::new(trie_node::Variant::Branch, self.branches_count)?;
        self.branches_count += 1;
        Ok(id)
    }

    pub fn write_extension(&mut self, node: ExtensionNode) -> Result<NodeId, Error> {
        let bytes = node.encode(self.hash_layout)?;
        debug_assert_eq!(bytes.len(), extension_record_size(self.hash_layout));
        self.extensions.write_all(&bytes)?;
        let id = NodeId::new(trie_node::Variant::Extension, self.extensions_count)?;
        self.extensions_count += 1;
        Ok(id)
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.accounts.flush()?;
        self.branches.flush()?;
        self.extensions.flush()?;
        self.values.flush()
    }

    /// Syncs every container file to disk, attempting each even once one
    /// has already failed, and returning the first failure encountered.
    pub fn close(self) -> std::io::Result<()> {
        let results = [
            self.accounts.sync_all(),
            self.branches.sync_all(),
            self.extensions.sync_all(),
            self.values.sync_all(),
        ];
        for result in results {
            result?;
        }
        Ok(())
    }
}

/// A sorted leaf ready to be folded into the trie: its full nibble path and
/// whatever a particular region needs to build its terminal node.
pub struct PendingLeaf<T> {
    pub path: NibblePath,
    pub payload: T,
}

/// Builds one storage region from a batch of `(key, value)` pairs, already
/// sorted by nibble path. Empty input yields the empty node.
pub fn build_storage_trie(
    writer: &mut ContainerWriter,
    mut leaves: Vec<PendingLeaf<([u8; 32], [u8; 32])>>,
) -> Result<(NodeId, Hash32), Error> {
    if leaves.is_empty() {
        return Ok((NodeId::EMPTY, hashing::empty_hash()));
    }
    leaves.sort_by(|a, b| a.path.to_vec().cmp(&b.path.to_vec()));
    build_region(writer, leaves, 0, &|writer, path, (key, value), suffix_len| {
        let node = ValueNode {
            key,
            value,
            suffix_len,
        };
        let hash = hashing::hash_value(&key, &value);
        let _ = &path;
        let id = writer.write_value(node)?;
        Ok((id, hash))
    })
}

/// One account, already positioned at its storage-root hash, ready to
/// become an `Account` leaf in the address region.
pub struct AccountLeaf {
    pub address: [u8; 20],
    pub info: AccountInfo,
    pub storage_root: NodeId,
    pub storage_hash: Hash32,
}

/// Builds the address region from a batch of accounts, already sorted by
/// nibble path.
pub fn build_address_trie(
    writer: &mut ContainerWriter,
    mut leaves: Vec<PendingLeaf<AccountLeaf>>,
) -> Result<(NodeId, Hash32), Error> {
    if leaves.is_empty() {
        return Ok((NodeId::EMPTY, hashing::empty_hash()));
    }
    leaves.sort_by(|a, b| a.path.to_vec().cmp(&b.path.to_vec()));
    build_region(writer, leaves, 0, &|writer, path, leaf, suffix_len| {
        let node = AccountNode {
            address: leaf.address,
            info: leaf.info,
            storage_root: leaf.storage_root,
            suffix_len,
        };
        let hash = hashing::hash_account(&node.info, leaf.storage_hash);
        let _ = &path;
        let id = writer.write_account(node)?;
        Ok((id, hash))
    })
}

type MakeLeaf<T> =
    dyn Fn(&mut ContainerWriter, NibblePath, T, u8) -> Result<(NodeId, Hash32), Error>;

/// The actual recursive fold: split `leaves` (all sharing the first `depth`
/// nibbles by construction) on their longest further common prefix, either
/// terminating in a single leaf or branching on the next diverging nibble.
fn build_region<T>(
    writer: &mut ContainerWriter,
    leaves: Vec<PendingLeaf<T>>,
    depth: usize,
    make_leaf: &MakeLeaf<T>,
) -> Result<(NodeId, Hash32), Error> {
    if leaves.len() == 1 {
        let PendingLeaf { path, payload } = leaves.into_iter().next().unwrap();
        let suffix_len = (path.len() - depth) as u8;
        return make_leaf(writer, path, payload, suffix_len);
    }

    let first_path = leaves[0].path.clone();
    let mut common = first_path.len() - depth;
    for leaf in &leaves[1..] {
        let shared = first_path.common_prefix_len(&leaf.path);
        common = common.min(shared.saturating_sub(depth));
    }
    let branch_depth = depth + common;

    let mut groups: [Vec<PendingLeaf<T>>; 16] = std::array::from_fn(|_| Vec::new());
    for leaf in leaves {
        let nibble = leaf.path.get(branch_depth) as usize;
        groups[nibble].push(leaf);
    }

    let mut children = BranchNode::EMPTY_CHILDREN;
    let mut child_hashes = [hashing::empty_hash(); 16];
    for (nibble, group) in groups.into_iter().enumerate() {
        if group.is_empty() {
            continue;
        }
        let (child_id, child_hash) = build_region(writer, group, branch_depth + 1, make_leaf)?;
        children[nibble] = child_id;
        child_hashes[nibble] = child_hash;
    }

    let hash_layout = writer.hash_layout;
    let branch_hash = hashing::hash_branch(&child_hashes);
    let branch = match hash_layout {
        HashLayout::WithParent => BranchNode {
            children,
            child_hashes: children.map(|_| HashSlot::Dirty),
            own_hash: HashSlot::Known(branch_hash),
            embedded_mask: 0,
        },
        HashLayout::WithChild => BranchNode {
            children,
            child_hashes: child_hashes.map(HashSlot::Known),
            own_hash: HashSlot::Dirty,
            embedded_mask: 0,
        },
    };
    let branch_id = writer.write_branch(branch)?;

    if common == 0 {
        return Ok((branch_id, branch_hash));
    }

    let prefix_nibbles: Vec<u8> = first_path.iter().skip(depth).take(common).collect();
    let prefix = NibblePath::from_nibbles(&prefix_nibbles)?;
    let extension_hash = hashing::hash_extension(&prefix, branch_hash);
    let extension = match hash_layout {
        HashLayout::WithParent => ExtensionNode {
            prefix,
            child: branch_id,
            child_hash: HashSlot::Dirty,
            own_hash: HashSlot::Known(extension_hash),
            embedded: false,
        },
        HashLayout::WithChild => ExtensionNode {
            prefix,
            child: branch_id,
            child_hash: HashSlot::Known(branch_hash),
            own_hash: HashSlot::Dirty,
            embedded: false,
        },
    };
    let extension_id = writer.write_extension(extension)?;
    Ok((extension_id, extension_hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use trie_node::EMPTY_CODE_HASH;

    #[test]
    fn empty_batch_yields_the_empty_node() {
        let tmp = tempfile::tempdir().unwrap();
        let mut writer = ContainerWriter::create(tmp.path(), HashLayout::WithChild).unwrap();
        let (id, hash) = build_storage_trie(&mut writer, Vec::new()).unwrap();
        assert_eq!(id, NodeId::EMPTY);
        assert_eq!(hash, hashing::empty_hash());
    }

    #[test]
    fn single_leaf_becomes_a_value_node_with_full_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let mut writer = ContainerWriter::create(tmp.path(), HashLayout::WithChild).unwrap();
        let path = NibblePath::from_bytes(&[1u8; 32]).unwrap();
        let leaves = vec![PendingLeaf {
            path: path.clone(),
            payload: ([1u8; 32], [2u8; 32]),
        }];
        let (id, _hash) = build_storage_trie(&mut writer, leaves).unwrap();
        assert_eq!(id.variant(), trie_node::Variant::Value);
    }

    #[test]
    fn two_leaves_sharing_no_prefix_become_siblings_under_one_branch() {
        let tmp = tempfile::tempdir().unwrap();
        let mut writer = ContainerWriter::create(tmp.path(), HashLayout::WithChild).unwrap();
        let mut key_a = [0u8; 32];
        key_a[0] = 0x00;
        let mut key_b = [0u8; 32];
        key_b[0] = 0xf0;
        let leaves = vec![
            PendingLeaf {
                path: NibblePath::from_bytes(&key_a).unwrap(),
                payload: (key_a, [1u8; 32]),
            },
            PendingLeaf {
                path: NibblePath::from_bytes(&key_b).unwrap(),
                payload: (key_b, [2u8; 32]),
            },
        ];
        let (id, _hash) = build_storage_trie(&mut writer, leaves).unwrap();
        assert_eq!(id.variant(), trie_node::Variant::Branch);
    }

    #[test]
    fn shared_prefix_is_compressed_into_an_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let mut writer = ContainerWriter::create(tmp.path(), HashLayout::WithChild).unwrap();
        let mut key_a = [0u8; 32];
        key_a[0] = 0x00;
        let mut key_b = [0u8; 32];
        key_b[0] = 0x0f;
        let leaves = vec![
            PendingLeaf {
                path: NibblePath::from_bytes(&key_a).unwrap(),
                payload: (key_a, [1u8; 32]),
            },
            PendingLeaf {
                path: NibblePath::from_bytes(&key_b).unwrap(),
                payload: (key_b, [2u8; 32]),
            },
        ];
        let (id, _hash) = build_storage_trie(&mut writer, leaves).unwrap();
        assert_eq!(id.variant(), trie_node::Variant::Extension);
    }

    #[test]
    fn address_trie_builds_a_single_account_leaf() {
        let tmp = tempfile::tempdir().unwrap();
        let mut writer = ContainerWriter::create(tmp.path(), HashLayout::WithChild).unwrap();
        let address = [7u8; 20];
        let path = NibblePath::from_bytes(&address).unwrap();
        let leaves = vec![PendingLeaf {
            path,
            payload: AccountLeaf {
                address,
                info: AccountInfo {
                    nonce: 1,
                    balance: [0u8; 32],
                    code_hash: *EMPTY_CODE_HASH,
                },
                storage_root: NodeId::EMPTY,
                storage_hash: hashing::empty_hash(),
            },
        }];
        let (id, _hash) = build_address_trie(&mut writer, leaves).unwrap();
        assert_eq!(id.variant(), trie_node::Variant::Account);
    }
}
