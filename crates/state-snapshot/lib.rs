//! Directory-backed persistence for a trie: a fixed four-container record
//! layout on disk (`accounts/`, `branches/`, `extensions/`, `values/`),
//! `forest.json` describing how those records are laid out, and the two
//! wire codecs from `trie-codec` wired to a concrete trie builder.
//!
//! The module boundary mirrors the dependency direction: `trie-codec`
//! parses and serializes wire bytes but never touches a trie; everything
//! here owns the sink/resolver implementations that turn parsed records
//! into on-disk nodes and back.

mod archive;
mod builder;
mod code_store;
mod error;
mod hashing;
mod layout;
mod live;
pub mod telemetry;

use std::io::{Cursor, Read, Write};
use std::path::Path;

use trie_node::TrieConfig;
use trie_visitor::{CancellationToken, VisitorConfig};

pub use code_store::CodeStore;
pub use error::Error;
pub use layout::ForestMetadata;

pub use archive::{export_archive_from, export_block_as_live, import_archive_into};
pub use live::{export_live_from, import_live_into};

/// Imports whichever wire format `reader` carries into a fresh `dir`,
/// auto-detected from the stream's magic number so the caller never has
/// to know in advance which kind of snapshot they were handed.
#[tracing::instrument(skip(reader, dir))]
pub fn import<R: Read>(reader: &mut R, dir: &Path, config: TrieConfig) -> Result<(), Error> {
    let longest = trie_codec::MAGIC_ARCH.len();
    let mut peek = vec![0u8; longest];
    let mut filled = 0;
    while filled < longest {
        let n = reader.read(&mut peek[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    peek.truncate(filled);

    let mut chained = Cursor::new(peek.clone()).chain(reader);
    if peek.len() >= trie_codec::MAGIC_LIVE.len() && &peek[..trie_codec::MAGIC_LIVE.len()] == trie_codec::MAGIC_LIVE
    {
        import_live_into(&mut chained, dir, config)?;
        Ok(())
    } else if peek.len() >= trie_codec::MAGIC_ARCH.len() && peek == trie_codec::MAGIC_ARCH {
        import_archive_into(&mut chained, dir, config)?;
        Ok(())
    } else {
        Err(Error::Codec(trie_codec::CodecError::BadMagic))
    }
}

/// Exports `dir`'s contents to `writer`. An archive directory with no
/// `block` re-streams its full diff history; with `block` set, it extracts
/// a whole-state snapshot as of that block (§4.5's genesis extraction). A
/// live directory accepts only `block = None`.
#[tracing::instrument(skip(writer, dir, visitor_config, cancellation))]
pub fn export<W: Write>(
    dir: &Path,
    writer: &mut W,
    block: Option<u32>,
    visitor_config: VisitorConfig,
    cancellation: &CancellationToken,
) -> Result<(), Error> {
    let meta = layout::read_forest_json(dir)?;

    if meta.mutable {
        if block.is_some() {
            return Err(Error::NotAnArchive(dir.display().to_string()));
        }
        let (root, hash) = meta.root.ok_or_else(|| Error::NotAnArchive(dir.display().to_string()))?;
        return export_live_from(dir, writer, root, hash, meta.configuration, visitor_config, cancellation);
    }

    match block {
        None => export_archive_from(dir, writer),
        Some(b) => export_block_as_live(dir, writer, b, meta.configuration, visitor_config, cancellation),
    }
}
