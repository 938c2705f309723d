//! Exercises the archive-specific scenarios: rejecting a live stream fed
//! into the archive importer with a specific diagnostic, and reconstructing
//! a historical block's live state from a multi-block archive.

use std::fs;

use trie_codec::CodecError;
use trie_node::{HashLayout, PathHashing, TrieConfig};
use trie_visitor::{CancellationToken, VisitorConfig};

fn config() -> TrieConfig {
    TrieConfig {
        hash_layout: HashLayout::WithChild,
        path_hashing: PathHashing::Hashed,
    }
}

fn block_bytes(block: u32, address: [u8; 20], balance: [u8; 32], nonce: u64, hash: [u8; 32]) -> Vec<u8> {
    use trie_node::EMPTY_CODE_HASH;
    let mut buf = Vec::new();
    buf.extend_from_slice(trie_codec::MAGIC_ARCH);
    buf.push(trie_codec::VERSION);
    buf.push(b'U');
    buf.extend_from_slice(&block.to_be_bytes());
    buf.push(b'H');
    buf.push(trie_codec::HashType::StateRoot as u8);
    buf.extend_from_slice(&hash);
    buf.push(b'A');
    buf.extend_from_slice(&address);
    buf.push(b'B');
    buf.extend_from_slice(&balance);
    buf.push(b'N');
    buf.extend_from_slice(&nonce.to_be_bytes());
    buf.push(b'c');
    buf.extend_from_slice(&*EMPTY_CODE_HASH);
    buf
}

/// Patches a zeroed-hash archive stream to the hash the importer actually
/// computes, the same probe technique `round_trip.rs` uses for live
/// streams: the first attempt's `RootMismatch` error carries the real hash.
fn real_block_hash(buf: &[u8]) -> [u8; 32] {
    let tmp = tempfile::tempdir().unwrap();
    match state_snapshot::import_archive_into(&mut &buf[..], &tmp.path().join("probe"), config()) {
        Err(state_snapshot::Error::Codec(CodecError::RootMismatch { actual, .. })) => actual,
        other => panic!("expected a root-mismatch probe, got {other:?}"),
    }
}

#[test]
fn live_import_rejects_an_archive_stream_with_a_specific_diagnostic() {
    let buf = block_bytes(0, [1u8; 20], [0u8; 32], 0, [0u8; 32]);
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("state");
    let err = state_snapshot::import_live_into(&mut &buf[..], &dir, config());
    assert!(matches!(
        err,
        Err(state_snapshot::Error::Codec(CodecError::ArchiveMagicInLiveContext))
    ));
}

#[test]
fn a_historical_block_is_recoverable_as_a_live_snapshot() {
    let address = [5u8; 20];
    let balance = [2u8; 32];
    let nonce = 9u64;
    let hash_pos = {
        let magic_and_version = trie_codec::MAGIC_ARCH.len() + 1;
        magic_and_version + 1 + 4 + 1 + 1
    };
    let mut buf = block_bytes(0, address, balance, nonce, [0u8; 32]);
    let hash = real_block_hash(&buf);
    buf[hash_pos..hash_pos + 32].copy_from_slice(&hash);

    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("archive");
    state_snapshot::import_archive_into(&mut buf.as_slice(), &dir, config()).unwrap();

    let mut out = Vec::new();
    state_snapshot::export_block_as_live(
        &dir,
        &mut out,
        0,
        config(),
        VisitorConfig::default(),
        &CancellationToken::new(),
    )
    .unwrap();
    assert_eq!(&out[..trie_codec::MAGIC_LIVE.len()], trie_codec::MAGIC_LIVE);
}

#[test]
fn importing_into_a_non_empty_directory_mentions_not_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("archive");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("stray.txt"), b"x").unwrap();

    let buf = block_bytes(0, [1u8; 20], [0u8; 32], 0, [0u8; 32]);
    let err = state_snapshot::import_archive_into(&mut buf.as_slice(), &dir, config());
    let message = format!("{}", err.unwrap_err());
    assert!(message.contains("not empty"));
}
