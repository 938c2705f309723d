use std::io::{Read, Write};
use std::path::Path;

use trie_node::{Hash32, Node, NodeId, TrieConfig};
use trie_visitor::{visit_all, CancellationToken, Decision, VisitorConfig};

use crate::code::{CodeDictionary, CodeResolver};
use crate::error::CodecError;
use crate::wire::{
    self, expect_live_magic, expect_version, read_array, read_token, read_u16, read_u64,
    write_all, write_u16, write_u64, HashType, MAGIC_LIVE, VERSION,
};

const REHASH_EVERY: u64 = 100_000;

/// Everything an exporter needs to walk the live trie: where it lives,
/// which record layout it's stored in, and the root it should serialize.
#[derive(Clone, Copy)]
pub struct LiveExportParams {
    pub trie_config: TrieConfig,
    pub visitor_config: VisitorConfig,
    pub root: NodeId,
    pub state_hash: Hash32,
}

/// Serializes the trie rooted at `params.root` as a whole-state snapshot.
///
/// Performs two full traversals: one pruning pass (storage skipped) that
/// resolves and collects referenced codes, and the real pass that emits
/// `A`/`S` records. Both go through the same [`trie_visitor::visit_all`]
/// used everywhere else, so export order always matches the trie's
/// pre-order layout.
#[tracing::instrument(skip(dir, writer, params, code_resolver, cancellation))]
pub fn export_live<W: Write>(
    dir: &Path,
    writer: &mut W,
    params: &LiveExportParams,
    code_resolver: &dyn CodeResolver,
    cancellation: &CancellationToken,
) -> Result<(), CodecError> {
    let mut codes = CodeDictionary::new();
    let mut pruning_config = params.visitor_config;
    pruning_config.storage_pruning = true;
    visit_all(
        dir,
        params.trie_config,
        pruning_config,
        params.root,
        cancellation,
        |_info, node| {
            if let Node::Account(account) = node {
                if let Some(bytes) = code_resolver.resolve(&account.info.code_hash) {
                    if !bytes.is_empty() {
                        codes.insert_with_hash(account.info.code_hash, bytes);
                    }
                }
            }
            Decision::Continue
        },
    )?;

    write_all(writer, MAGIC_LIVE)?;
    write_all(writer, &[VERSION])?;
    write_all(writer, b"H")?;
    write_all(writer, &[HashType::StateRoot as u8])?;
    write_all(writer, &params.state_hash)?;

    for (hash, bytes) in codes.iter_sorted() {
        let _ = hash;
        write_all(writer, b"C")?;
        write_u16(writer, bytes.len() as u16)?;
        write_all(writer, bytes)?;
    }

    let mut export_err: Option<CodecError> = None;
    visit_all(
        dir,
        params.trie_config,
        params.visitor_config,
        params.root,
        cancellation,
        |_info, node| {
            if export_err.is_some() {
                return Decision::Abort;
            }
            if let Err(e) = write_entry(writer, node) {
                export_err = Some(e);
                return Decision::Abort;
            }
            Decision::Continue
        },
    )?;
    if let Some(e) = export_err {
        return Err(e);
    }

    Ok(())
}

fn write_entry<W: Write>(writer: &mut W, node: &Node) -> Result<(), CodecError> {
    match node {
        Node::Account(account) => {
            write_all(writer, b"A")?;
            write_all(writer, &account.address)?;
            write_all(writer, &account.info.balance)?;
            write_u64(writer, account.info.nonce)?;
            write_all(writer, &account.info.code_hash)?;
        }
        Node::Value(value) => {
            write_all(writer, b"S")?;
            write_all(writer, &value.key)?;
            write_all(writer, &value.value)?;
        }
        _ => {}
    }
    Ok(())
}

/// Destination for a parsed live-snapshot stream. Implemented by whatever
/// owns the fresh trie builder and code store the import writes into;
/// `trie-codec` never touches trie construction directly.
pub trait LiveImportSink {
    fn add_code(&mut self, hash: Hash32, bytes: Vec<u8>) -> Result<(), CodecError>;
    fn open_account(
        &mut self,
        address: [u8; 20],
        balance: [u8; 32],
        nonce: u64,
        code_hash: Hash32,
    ) -> Result<(), CodecError>;
    fn set_storage(&mut self, key: [u8; 32], value: [u8; 32]) -> Result<(), CodecError>;
    fn rehash(&mut self) -> Result<(), CodecError>;
    fn finalize(&mut self) -> Result<(NodeId, Hash32), CodecError>;
}

/// Parses a whole-state snapshot, applying every record to `sink` and
/// checking the final root hash against the embedded one.
#[tracing::instrument(skip(reader, sink))]
pub fn import_live<R: Read>(
    reader: &mut R,
    sink: &mut impl LiveImportSink,
) -> Result<(NodeId, Hash32), CodecError> {
    expect_live_magic(reader)?;
    expect_version(reader)?;

    let mut codes = CodeDictionary::seeded();
    let mut state_hash: Option<Hash32> = None;
    let mut entries_seen: u64 = 0;
    let mut account_open = false;

    loop {
        let token = match read_token(reader)? {
            Some(t) => t,
            None => break,
        };
        match token {
            b'H' => {
                let hash_type = wire::read_u8(reader)?;
                HashType::from_u8(hash_type)?;
                let hash: Hash32 = read_array(reader)?;
                state_hash = Some(hash);
            }
            b'C' => {
                let len = read_u16(reader)? as usize;
                let bytes = wire::read_vec(reader, len)?;
                let hash = codes.insert(bytes.clone());
                sink.add_code(hash, bytes)?;
            }
            b'A' => {
                let address: [u8; 20] = read_array(reader)?;
                let balance: [u8; 32] = read_array(reader)?;
                let nonce = read_u64(reader)?;
                let code_hash: Hash32 = read_array(reader)?;
                if !codes.contains(&code_hash) {
                    return Err(CodecError::MissingCode(code_hash));
                }
                sink.open_account(address, balance, nonce, code_hash)?;
                account_open = true;
                entries_seen += 1;
            }
            b'S' => {
                if !account_open {
                    return Err(CodecError::NoOpenAccount);
                }
                let key: [u8; 32] = read_array(reader)?;
                let value: [u8; 32] = read_array(reader)?;
                sink.set_storage(key, value)?;
                entries_seen += 1;
            }
            other => return Err(CodecError::UnexpectedToken(other)),
        }
        if entries_seen > 0 && entries_seen % REHASH_EVERY == 0 {
            sink.rehash()?;
        }
    }

    let recorded = state_hash.ok_or(CodecError::MissingStateHash)?;
    let (root_id, computed) = sink.finalize()?;
    if computed != recorded {
        return Err(CodecError::RootMismatch {
            expected: recorded,
            actual: computed,
        });
    }
    Ok((root_id, computed))
}
