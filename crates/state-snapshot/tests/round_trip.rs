//! End-to-end exercises of the top-level `export`/`import` entry points
//! against real directories, covering the round-trip and determinism
//! properties a unit test inside a single module can't see: a whole
//! directory tree surviving an export, a fresh import, and a re-export.

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

/// Builds a well-formed live-snapshot byte stream for one account with one
/// storage slot, by probing the builder with a placeholder hash first (its
/// `RootMismatch` error carries the hash actually computed) and patching
/// that hash into the real buffer.
fn live_stream(address: [u8; 20], balance: [u8; 32], nonce: u64, key: [u8; 32], value: [u8; 32]) -> Vec<u8> {
    use trie_node::EMPTY_CODE_HASH;
    let mut buf = Vec::new();
    buf.extend_from_slice(trie_codec::MAGIC_LIVE);
    buf.push(trie_codec::VERSION);
    let hash_pos = buf.len() + 2;
    buf.push(b'H');
    buf.push(trie_codec::HashType::StateRoot as u8);
    buf.extend_from_slice(&[0u8; 32]);
    buf.push(b'A');
    buf.extend_from_slice(&address);
    buf.extend_from_slice(&balance);
    buf.extend_from_slice(&nonce.to_be_bytes());
    buf.extend_from_slice(&*EMPTY_CODE_HASH);
    buf.push(b'S');
    buf.extend_from_slice(&key);
    buf.extend_from_slice(&value);

    let tmp = tempfile::tempdir().unwrap();
    let probe = state_snapshot::import_live_into(&mut buf.as_slice(), &tmp.path().join("probe"), config());
    let hash = match probe {
        Err(state_snapshot::Error::Codec(CodecError::RootMismatch { actual, .. })) => actual,
        other => panic!("expected a root-mismatch probe, got {other:?}"),
    };
    buf[hash_pos..hash_pos + 32].copy_from_slice(&hash);
    buf
}

#[test]
fn importing_a_live_snapshot_and_re_exporting_reproduces_the_root_hash() {
    let buf = live_stream([1u8; 20], [9u8; 32], 3, [2u8; 32], [5u8; 32]);

    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("state");
    state_snapshot::import(&mut buf.as_slice(), &dir, config()).unwrap();

    let mut exported = Vec::new();
    state_snapshot::export(
        &dir,
        &mut exported,
        None,
        VisitorConfig::default(),
        &CancellationToken::new(),
    )
    .unwrap();

    // Re-importing the re-export into a second, independent directory must
    // reach the same recorded root hash: property 2 of the accompanying
    // spec's testable-properties list.
    let second_dir = tmp.path().join("state2");
    state_snapshot::import(&mut exported.as_slice(), &second_dir, config()).unwrap();

    let first_meta: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.join("forest.json")).unwrap()).unwrap();
    let second_meta: serde_json::Value =
        serde_json::from_slice(&fs::read(second_dir.join("forest.json")).unwrap()).unwrap();
    assert_eq!(first_meta["root"], second_meta["root"]);
}

#[test]
fn export_is_byte_for_byte_deterministic_across_repeated_calls() {
    let buf = live_stream([4u8; 20], [1u8; 32], 11, [6u8; 32], [7u8; 32]);

    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("state");
    state_snapshot::import(&mut buf.as_slice(), &dir, config()).unwrap();

    let mut runs = Vec::new();
    for _ in 0..3 {
        let mut out = Vec::new();
        state_snapshot::export(&dir, &mut out, None, VisitorConfig::default(), &CancellationToken::new()).unwrap();
        runs.push(out);
    }
    assert!(runs.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn import_refuses_a_non_empty_target_directory_before_touching_any_container() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("state");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("stray.txt"), b"pre-existing").unwrap();

    let buf = live_stream([8u8; 20], [0u8; 32], 0, [0u8; 32], [1u8; 32]);
    let err = state_snapshot::import(&mut buf.as_slice(), &dir, config());
    assert!(matches!(err, Err(state_snapshot::Error::TargetNotEmpty { .. })));
    assert!(!dir.join("accounts").exists());
}

#[test]
fn a_truncated_stream_surfaces_an_io_or_format_error_not_a_panic() {
    let full = live_stream([2u8; 20], [3u8; 32], 5, [4u8; 32], [5u8; 32]);
    let truncated = &full[..full.len() / 2];

    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("state");
    let err = state_snapshot::import(&mut &truncated[..], &dir, config());
    assert!(err.is_err());
}
