use thiserror::Error;

use crate::{IdError, PathError};

/// Everything that can go wrong decoding or encoding a single node record.
/// This is the `trie-node` crate's narrow slice of the wider `Format`/
/// `Integrity` taxonomy from §7 — higher crates fold it into their own
/// error enums via `#[from]`.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("truncated record: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("unknown node variant tag {0}")]
    UnknownVariant(u8),
    #[error(transparent)]
    InvalidId(#[from] IdError),
    #[error(transparent)]
    InvalidPath(#[from] PathError),
    #[error("branch node must have at least two non-empty children, found {0}")]
    TooFewChildren(usize),
    #[error("extension node must reference a branch child")]
    ExtensionChildNotBranch,
    #[error("extension node prefix must not be empty")]
    EmptyExtensionPrefix,
    #[error("account info must not be empty")]
    EmptyAccountInfo,
    #[error("value node must carry a non-zero value")]
    ZeroValue,
    #[error("cannot serialize a node whose retained hash is still dirty")]
    DirtyHash,
}
