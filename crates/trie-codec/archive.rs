use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

use trie_node::{Hash32, NodeId, TrieConfig};
use trie_visitor::{CancellationToken, VisitorConfig};

use crate::code::{CodeDictionary, CodeResolver};
use crate::error::CodecError;
use crate::live::{export_live, LiveExportParams};
use crate::wire::{
    self, expect_archive_magic, expect_version, read_array, read_token, read_u16, read_u32,
    read_u64, write_all, write_u16, write_u32, write_u64, HashType, MAGIC_ARCH, VERSION,
};

/// One account's changes within a single block's diff.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountChange {
    pub removed: bool,
    pub balance: Option<[u8; 32]>,
    pub nonce: Option<u64>,
    pub code_hash: Option<Hash32>,
    /// Ordered by key so exporting never needs to sort storage separately.
    pub storage: BTreeMap<[u8; 32], [u8; 32]>,
}

impl AccountChange {
    pub fn is_empty(&self) -> bool {
        !self.removed
            && self.balance.is_none()
            && self.nonce.is_none()
            && self.code_hash.is_none()
            && self.storage.is_empty()
    }
}

/// One block's worth of account diffs, keyed (and thus ordered) by address.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockDiff {
    pub block: u32,
    pub hash: Hash32,
    pub accounts: BTreeMap<[u8; 20], AccountChange>,
}

impl BlockDiff {
    pub fn is_empty(&self) -> bool {
        self.accounts.values().all(AccountChange::is_empty)
    }
}

/// Serializes a block-indexed diff stream: the referenced codes once,
/// sorted, followed by every non-empty block in ascending order.
#[tracing::instrument(skip(writer, codes, blocks, cancellation))]
pub fn export_archive<W: Write>(
    writer: &mut W,
    codes: &CodeDictionary,
    blocks: impl IntoIterator<Item = BlockDiff>,
    cancellation: &CancellationToken,
) -> Result<(), CodecError> {
    write_all(writer, MAGIC_ARCH)?;
    write_all(writer, &[VERSION])?;

    for (_, bytes) in codes.iter_sorted() {
        write_all(writer, b"C")?;
        write_u16(writer, bytes.len() as u16)?;
        write_all(writer, bytes)?;
    }

    for block in blocks {
        if cancellation.is_cancelled() {
            return Err(CodecError::Visit(trie_visitor::VisitorError::Cancelled));
        }
        if block.is_empty() {
            continue;
        }
        write_all(writer, b"U")?;
        write_u32(writer, block.block)?;
        write_all(writer, b"H")?;
        write_all(writer, &[HashType::StateRoot as u8])?;
        write_all(writer, &block.hash)?;

        for (address, change) in &block.accounts {
            if change.is_empty() {
                continue;
            }
            write_all(writer, b"A")?;
            write_all(writer, address)?;
            if change.removed {
                write_all(writer, b"R")?;
            }
            if let Some(balance) = change.balance {
                write_all(writer, b"B")?;
                write_all(writer, &balance)?;
            }
            if let Some(nonce) = change.nonce {
                write_all(writer, b"N")?;
                write_u64(writer, nonce)?;
            }
            if let Some(code_hash) = change.code_hash {
                write_all(writer, b"c")?;
                write_all(writer, &code_hash)?;
            }
            for (key, value) in &change.storage {
                write_all(writer, b"V")?;
                write_all(writer, key)?;
                write_all(writer, value)?;
            }
        }
    }

    Ok(())
}

/// Extracts a whole-state snapshot as of one historical root: the archive
/// codec keeps no separate wire encoding of its own for this, it simply
/// re-enters the live exporter at a point in the trie's history that a
/// block-indexed root lookup (owned by whatever stores `roots.dat`) has
/// already resolved.
#[tracing::instrument(skip(dir, writer, code_resolver, cancellation))]
pub fn export_block_as_live<W: Write>(
    dir: &Path,
    writer: &mut W,
    trie_config: TrieConfig,
    visitor_config: VisitorConfig,
    root: NodeId,
    state_hash: Hash32,
    code_resolver: &dyn CodeResolver,
    cancellation: &CancellationToken,
) -> Result<(), CodecError> {
    let params = LiveExportParams {
        trie_config,
        visitor_config,
        root,
        state_hash,
    };
    export_live(dir, writer, &params, code_resolver, cancellation)
}

/// Destination for a parsed archive stream, one call per wire token. A
/// block's accumulated changes are committed on `finalize_block`, which is
/// also where the per-block root-hash check happens.
pub trait ArchiveImportSink {
    fn add_code(&mut self, hash: Hash32, bytes: Vec<u8>) -> Result<(), CodecError>;
    fn begin_block(&mut self, block: u32) -> Result<(), CodecError>;
    fn open_account(&mut self, address: [u8; 20]) -> Result<(), CodecError>;
    fn remove_account(&mut self) -> Result<(), CodecError>;
    fn set_balance(&mut self, balance: [u8; 32]) -> Result<(), CodecError>;
    fn set_nonce(&mut self, nonce: u64) -> Result<(), CodecError>;
    fn set_code_hash(&mut self, code_hash: Hash32) -> Result<(), CodecError>;
    fn set_storage(&mut self, key: [u8; 32], value: [u8; 32]) -> Result<(), CodecError>;
    fn finalize_block(&mut self, block: u32, declared_hash: Hash32) -> Result<(), CodecError>;
}

/// Parses a block-indexed diff stream, forwarding every change to `sink`
/// and committing each block as its terminating `U`/EOF is reached.
#[tracing::instrument(skip(reader, sink))]
pub fn import_archive<R: Read>(
    reader: &mut R,
    sink: &mut impl ArchiveImportSink,
) -> Result<(), CodecError> {
    expect_archive_magic(reader)?;
    expect_version(reader)?;

    let mut codes = CodeDictionary::seeded();
    let mut current_block: Option<u32> = None;
    let mut declared_hash: Option<Hash32> = None;
    let mut account_open = false;

    loop {
        let token = match read_token(reader)? {
            Some(t) => t,
            None => break,
        };
        match token {
            b'C' => {
                let len = read_u16(reader)? as usize;
                let bytes = wire::read_vec(reader, len)?;
                let hash = codes.insert(bytes.clone());
                sink.add_code(hash, bytes)?;
            }
            b'U' => {
                if let Some(block) = current_block.take() {
                    let hash = declared_hash.take().ok_or(CodecError::MissingStateHash)?;
                    sink.finalize_block(block, hash)?;
                }
                account_open = false;
                let block = read_u32(reader)?;
                current_block = Some(block);
                sink.begin_block(block)?;
            }
            b'H' => {
                if current_block.is_none() {
                    return Err(CodecError::UnexpectedToken(token));
                }
                let hash_type = wire::read_u8(reader)?;
                HashType::from_u8(hash_type)?;
                declared_hash = Some(read_array(reader)?);
            }
            b'A' => {
                let address: [u8; 20] = read_array(reader)?;
                sink.open_account(address)?;
                account_open = true;
            }
            b'R' => {
                if !account_open {
                    return Err(CodecError::NoOpenAccount);
                }
                sink.remove_account()?;
            }
            b'B' => {
                if !account_open {
                    return Err(CodecError::NoOpenAccount);
                }
                let balance: [u8; 32] = read_array(reader)?;
                sink.set_balance(balance)?;
            }
            b'N' => {
                if !account_open {
                    return Err(CodecError::NoOpenAccount);
                }
                let nonce = read_u64(reader)?;
                sink.set_nonce(nonce)?;
            }
            b'c' => {
                if !account_open {
                    return Err(CodecError::NoOpenAccount);
                }
                let code_hash: Hash32 = read_array(reader)?;
                if !codes.contains(&code_hash) {
                    return Err(CodecError::MissingCode(code_hash));
                }
                sink.set_code_hash(code_hash)?;
            }
            b'V' => {
                if !account_open {
                    return Err(CodecError::NoOpenAccount);
                }
                let key: [u8; 32] = read_array(reader)?;
                let value: [u8; 32] = read_array(reader)?;
                sink.set_storage(key, value)?;
            }
            b'D' => {
                if !account_open {
                    return Err(CodecError::NoOpenAccount);
                }
                let key: [u8; 32] = read_array(reader)?;
                sink.set_storage(key, [0u8; 32])?;
            }
            other => return Err(CodecError::UnexpectedToken(other)),
        }
    }

    if let Some(block) = current_block {
        let hash = declared_hash.ok_or(CodecError::MissingStateHash)?;
        sink.finalize_block(block, hash)?;
    }

    Ok(())
}
