use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use trie_node::{Hash32, NodeId, TrieConfig};

use crate::error::Error;

const ROOT_RECORD_SIZE: usize = 6 + 32;

/// `forest.json`'s shape: which record/path-hashing configuration the
/// directory's containers were written under, and whether the directory
/// is still an open live trie or a sealed archive import.
///
/// A live directory has no `roots.dat` (only archives are block-indexed),
/// so its single root is carried here instead — otherwise the top-level
/// `export` entry point would have nowhere to recover it from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ForestMetadata {
    pub configuration: TrieConfig,
    pub mutable: bool,
    pub root: Option<(NodeId, Hash32)>,
}

/// Fails *Precondition* if `dir` exists and already contains anything;
/// otherwise creates it. Checked before any container file is opened, per
/// §7's "non-empty target directories are rejected before opening any
/// file".
pub fn ensure_empty(dir: &Path) -> Result<(), Error> {
    match fs::read_dir(dir) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                return Err(Error::TargetNotEmpty {
                    path: dir.display().to_string(),
                });
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            fs::create_dir_all(dir)?;
            Ok(())
        }
        Err(e) => Err(Error::Io(e)),
    }
}

pub fn write_forest_json(dir: &Path, meta: &ForestMetadata) -> Result<(), Error> {
    let bytes = serde_json::to_vec_pretty(meta)?;
    fs::write(dir.join("forest.json"), bytes)?;
    Ok(())
}

pub fn read_forest_json(dir: &Path) -> Result<ForestMetadata, Error> {
    let bytes = fs::read(dir.join("forest.json"))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Writes `entries[i]` as block `i`'s `(root_id, root_hash)` pair, in
/// order, overwriting any existing `roots.dat`.
pub fn write_roots(dir: &Path, entries: &[(NodeId, Hash32)]) -> Result<(), Error> {
    let mut file = fs::File::create(dir.join("roots.dat"))?;
    let mut buf = Vec::with_capacity(entries.len() * ROOT_RECORD_SIZE);
    for (id, hash) in entries {
        buf.extend_from_slice(&id.to_bytes());
        buf.extend_from_slice(hash);
    }
    file.write_all(&buf)?;
    Ok(())
}

pub fn read_roots(dir: &Path) -> Result<Vec<(NodeId, Hash32)>, Error> {
    let mut file = fs::File::open(dir.join("roots.dat"))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let mut roots = Vec::with_capacity(bytes.len() / ROOT_RECORD_SIZE);
    for chunk in bytes.chunks(ROOT_RECORD_SIZE) {
        if chunk.len() != ROOT_RECORD_SIZE {
            break;
        }
        let id = NodeId::from_slice(&chunk[..6])?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&chunk[6..]);
        roots.push((id, hash));
    }
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trie_node::Variant;

    #[test]
    fn empty_directory_passes_and_missing_directory_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("fresh");
        assert!(ensure_empty(&target).is_ok());
        assert!(target.is_dir());
        assert!(ensure_empty(&target).is_ok());
    }

    #[test]
    fn non_empty_directory_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("stray.txt"), b"hi").unwrap();
        assert!(matches!(
            ensure_empty(tmp.path()),
            Err(Error::TargetNotEmpty { .. })
        ));
    }

    #[test]
    fn forest_json_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let meta = ForestMetadata {
            configuration: TrieConfig::default(),
            mutable: true,
            root: Some((NodeId::EMPTY, [0u8; 32])),
        };
        write_forest_json(tmp.path(), &meta).unwrap();
        let read = read_forest_json(tmp.path()).unwrap();
        assert_eq!(read.mutable, meta.mutable);
        assert_eq!(read.root, meta.root);
    }

    #[test]
    fn roots_round_trip_in_block_order() {
        let tmp = tempfile::tempdir().unwrap();
        let entries = vec![
            (NodeId::EMPTY, [0u8; 32]),
            (NodeId::new(Variant::Account, 0).unwrap(), [9u8; 32]),
        ];
        write_roots(tmp.path(), &entries).unwrap();
        assert_eq!(read_roots(tmp.path()).unwrap(), entries);
    }
}
