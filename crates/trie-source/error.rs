use thiserror::Error;

use trie_node::{IdError, NodeError};

/// Everything that can go wrong opening a node source or fetching a record
/// from it. Folds into §7's wider `Format`/`IO` taxonomy one level up.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{container} container is short: expected at least {expected} bytes, found {found}")]
    ShortRead {
        container: &'static str,
        expected: u64,
        found: u64,
    },
    #[error(transparent)]
    InvalidId(#[from] IdError),
    #[error(transparent)]
    InvalidRecord(#[from] NodeError),
}
