use serde::{Deserialize, Serialize};

/// Which half of a branch/extension record carries the hash on disk — the
/// "one knob" §4.1 calls out that importers and exporters must agree on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashLayout {
    /// Parent stores its own hash; children's hashes are dirty on load.
    WithParent,
    /// Parent stores each child's hash (plus the embedded-child mask);
    /// its own hash is dirty on load.
    WithChild,
}

impl Default for HashLayout {
    fn default() -> Self {
        HashLayout::WithChild
    }
}

/// Whether nibble paths are derived from raw addresses/keys or from their
/// keccak pre-image, per §3's "Nibble path" definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathHashing {
    Raw,
    Hashed,
}

impl Default for PathHashing {
    fn default() -> Self {
        PathHashing::Hashed
    }
}

/// The knobs shared by every component: node record layout and the
/// path-hashing policy in force for this trie. Nothing here is global —
/// every entry point takes one of these explicitly (§9 "Global state: None").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrieConfig {
    pub hash_layout: HashLayout,
    pub path_hashing: PathHashing,
}

impl Default for TrieConfig {
    fn default() -> Self {
        Self {
            hash_layout: HashLayout::default(),
            path_hashing: PathHashing::default(),
        }
    }
}
