use trie_node::{Node, NodeId};

use crate::position::Position;

/// The node's children in pre-order: up to 16 for a branch (ordered by
/// nibble), exactly one for an extension or a non-pruned account with
/// storage, none for a value or the empty node.
pub fn children_of(node: &Node, position: &Position, storage_pruning: bool) -> Vec<(Position, NodeId)> {
    match node {
        Node::Empty | Node::Value(_) => Vec::new(),
        Node::Branch(branch) => branch
            .children
            .iter()
            .enumerate()
            .filter(|(_, id)| !id.is_empty())
            .map(|(nibble, id)| (position.child(nibble as u8), *id))
            .collect(),
        Node::Extension(ext) => vec![(position.child(0), ext.child)],
        Node::Account(account) => {
            if storage_pruning || account.storage_root.is_empty() {
                Vec::new()
            } else {
                vec![(position.child(0), account.storage_root)]
            }
        }
    }
}

/// Like [`children_of`] but without position bookkeeping, for callers (the
/// traversal consumer) that only need the ids, in pre-order.
pub fn child_ids(node: &Node, storage_pruning: bool) -> Vec<NodeId> {
    children_of(node, &Position::root(), storage_pruning)
        .into_iter()
        .map(|(_, id)| id)
        .collect()
}
