use std::path::Path;

use trie_node::{
    branch_record_size, extension_record_size, AccountNode, BranchNode, ExtensionNode,
    HashLayout, Node, NodeId, TrieConfig, Variant, ValueNode, ACCOUNT_RECORD_SIZE,
    VALUE_RECORD_SIZE,
};

use crate::{container::Container, error::SourceError};

/// Read-only, position-indexed access to each node family, backed by the
/// four append-only container files of an on-disk trie directory.
///
/// A `NodeSource` owns its file descriptors exclusively; nothing about it
/// is shared between threads. The parallel visitor gives each worker its
/// own source rather than sharing one, so this type never needs internal
/// synchronization.
pub struct NodeSource {
    config: TrieConfig,
    accounts: Container,
    branches: Container,
    extensions: Container,
    values: Container,
}

impl NodeSource {
    #[tracing::instrument(skip(config), fields(dir = %dir.display()))]
    pub fn open(dir: &Path, config: TrieConfig) -> Result<Self, SourceError> {
        let branch_size = branch_record_size(config.hash_layout);
        let extension_size = extension_record_size(config.hash_layout);
        Ok(Self {
            config,
            accounts: Container::open(dir, "accounts", ACCOUNT_RECORD_SIZE)?,
            branches: Container::open(dir, "branches", branch_size)?,
            extensions: Container::open(dir, "extensions", extension_size)?,
            values: Container::open(dir, "values", VALUE_RECORD_SIZE)?,
        })
    }

    pub fn config(&self) -> TrieConfig {
        self.config
    }

    /// Fetches the node for `id`. Returns the empty singleton for
    /// [`NodeId::EMPTY`] without touching any container.
    pub fn get(&mut self, id: NodeId) -> Result<Node, SourceError> {
        match id.variant() {
            Variant::Empty => Ok(Node::Empty),
            Variant::Branch => {
                let bytes = self.branches.read(id.index())?;
                Ok(Node::Branch(BranchNode::decode(
                    &bytes,
                    self.config.hash_layout,
                )?))
            }
            Variant::Extension => {
                let bytes = self.extensions.read(id.index())?;
                Ok(Node::Extension(ExtensionNode::decode(
                    &bytes,
                    self.config.hash_layout,
                )?))
            }
            Variant::Account => {
                let bytes = self.accounts.read(id.index())?;
                Ok(Node::Account(AccountNode::decode(&bytes)?))
            }
            Variant::Value => {
                let bytes = self.values.read(id.index())?;
                Ok(Node::Value(ValueNode::decode(&bytes)?))
            }
        }
    }

    /// Closes every container, syncing each to disk. A `NodeSource` is also
    /// dropped cleanly without calling this, but callers that want explicit
    /// close-time IO errors (e.g. on network filesystems) should call it.
    /// Every container is attempted even once one has already failed, and
    /// the first failure encountered is the one returned.
    pub fn close(self) -> Result<(), SourceError> {
        let results = [
            self.accounts.close(),
            self.branches.close(),
            self.extensions.close(),
            self.values.close(),
        ];
        for result in results {
            result?;
        }
        Ok(())
    }
}
