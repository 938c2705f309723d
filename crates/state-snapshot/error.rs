use thiserror::Error;

use trie_codec::CodecError;
use trie_node::{Hash32, IdError, NodeError, PathError};
use trie_source::SourceError;
use trie_visitor::VisitorError;

/// §7's full taxonomy, as seen at the top-level `export`/`import` entry
/// points. Leaf crates each carry their own narrow slice; this enum folds
/// them together via `#[from]` and adds the handful of failures that only
/// make sense once a directory layout is involved.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Codec(#[from] CodecError),
    #[error("{0}")]
    Visit(#[from] VisitorError),
    #[error("{0}")]
    Source(#[from] SourceError),
    #[error("{0}")]
    Node(#[from] NodeError),
    #[error("{0}")]
    InvalidId(#[from] IdError),
    #[error("{0}")]
    InvalidPath(#[from] PathError),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("target directory {path} is not empty")]
    TargetNotEmpty { path: String },
    #[error("{0} is a live trie directory, not an archive directory")]
    NotAnArchive(String),
    #[error("{0} is an archive directory, not a live trie directory")]
    NotLive(String),
    #[error("root hash mismatch at block {block}: recorded {expected:02x?}, computed {actual:02x?}")]
    BlockRootMismatch {
        block: u32,
        expected: Hash32,
        actual: Hash32,
    },
    #[error("no account is open for address {0:02x?}")]
    UnknownAccount([u8; 20]),
    #[error("cancelled")]
    Cancelled,
    #[error("{original} (close also failed: {close})")]
    Closing {
        #[source]
        original: Box<Error>,
        close: std::io::Error,
    },
}

impl Error {
    /// Joins a close-time failure onto whatever error the operation already
    /// failed with, per §7's "close errors are joined with the originating
    /// error" propagation rule. When the operation itself succeeded, the
    /// close error becomes the result; when both failed, the original
    /// error wins but carries the close failure alongside it.
    pub fn join_close<T>(outcome: Result<T, Error>, close: std::io::Result<()>) -> Result<T, Error> {
        match (outcome, close) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(Error::Io(e)),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => Err(Error::Closing {
                original: Box::new(e),
                close: close_err,
            }),
        }
    }
}
