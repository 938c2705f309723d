use thiserror::Error;

use trie_node::Hash32;
use trie_visitor::VisitorError;

/// §7's `Format`/`Integrity` slice, as seen from a wire codec.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad magic: expected a live snapshot or archive stream header")]
    BadMagic,
    #[error("stream is an archive diff stream, not a live snapshot")]
    ArchiveMagicInLiveContext,
    #[error("stream is a live snapshot, not an archive diff stream")]
    LiveMagicInArchiveContext,
    #[error("unsupported wire version {0}")]
    UnsupportedVersion(u8),
    #[error("unsupported hash type {0}")]
    UnsupportedHashType(u8),
    #[error("unexpected token byte {0:#04x}")]
    UnexpectedToken(u8),
    #[error("no code registered for referenced hash {0:02x?}")]
    MissingCode(Hash32),
    #[error("stream carried no state hash record")]
    MissingStateHash,
    #[error("account-scoped record with no account currently open")]
    NoOpenAccount,
    #[error("root hash mismatch: recorded {expected:02x?}, computed {actual:02x?}")]
    RootMismatch { expected: Hash32, actual: Hash32 },
    #[error("traversal error: {0}")]
    Visit(#[from] VisitorError),
    #[error("builder error: {0}")]
    Builder(String),
}
