use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use trie_codec::{CodeDictionary, CodeResolver};
use trie_node::{Hash32, Hasher, Keccak256Hasher};

use crate::error::Error;

/// The durable `{code_hash -> bytes}` store behind a trie directory's
/// accounts. Laid out as one append-only `codes.dat` (`hash(32) |
/// length(4, big-endian) | bytes`) plus an in-memory offset index rebuilt
/// on open — `trie-codec` never sees this file directly, only through the
/// [`CodeResolver`] impl below.
pub struct CodeStore {
    path: PathBuf,
    file: File,
    index: BTreeMap<Hash32, (u64, u32)>,
}

impl CodeStore {
    pub fn create(dir: &Path) -> Result<Self, Error> {
        let path = dir.join("codes.dat");
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            file,
            index: BTreeMap::new(),
        })
    }

    pub fn open(dir: &Path) -> Result<Self, Error> {
        let path = dir.join("codes.dat");
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        let index = Self::rebuild_index(&mut file)?;
        Ok(Self { path, file, index })
    }

    fn rebuild_index(file: &mut File) -> Result<BTreeMap<Hash32, (u64, u32)>, Error> {
        file.seek(SeekFrom::Start(0))?;
        let mut index = BTreeMap::new();
        let mut offset = 0u64;
        loop {
            let mut header = [0u8; 36];
            match file.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(Error::Io(e)),
            }
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&header[..32]);
            let len = u32::from_be_bytes(header[32..].try_into().unwrap());
            let body_offset = offset + 36;
            let mut body = vec![0u8; len as usize];
            file.read_exact(&mut body)?;
            index.insert(hash, (body_offset, len));
            offset = body_offset + len as u64;
        }
        Ok(index)
    }

    pub fn contains(&self, hash: &Hash32) -> bool {
        self.index.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Appends `bytes` under its Keccak-256 hash, a no-op if already present.
    pub fn insert(&mut self, bytes: &[u8]) -> Result<Hash32, Error> {
        let hash = Keccak256Hasher::hash(bytes);
        self.insert_with_hash(hash, bytes)?;
        Ok(hash)
    }

    pub fn insert_with_hash(&mut self, hash: Hash32, bytes: &[u8]) -> Result<(), Error> {
        if self.index.contains_key(&hash) {
            return Ok(());
        }
        let offset = self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&hash)?;
        self.file.write_all(&(bytes.len() as u32).to_be_bytes())?;
        self.file.write_all(bytes)?;
        self.index.insert(hash, (offset + 36, bytes.len() as u32));
        Ok(())
    }

    pub fn get(&self, hash: &Hash32) -> Result<Option<Vec<u8>>, Error> {
        let Some(&(offset, len)) = self.index.get(hash) else {
            return Ok(None);
        };
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut bytes = vec![0u8; len as usize];
        file.read_exact(&mut bytes)?;
        Ok(Some(bytes))
    }

    /// Syncs the code file to disk.
    pub fn close(self) -> std::io::Result<()> {
        self.file.sync_all()
    }

    /// Materializes the whole store as a [`CodeDictionary`], the in-memory
    /// form the wire codecs serialize from.
    pub fn to_dictionary(&self) -> Result<CodeDictionary, Error> {
        let mut dict = CodeDictionary::new();
        for hash in self.index.keys() {
            if let Some(bytes) = self.get(hash)? {
                dict.insert_with_hash(*hash, bytes);
            }
        }
        Ok(dict)
    }
}

impl CodeResolver for CodeStore {
    fn resolve(&self, hash: &Hash32) -> Option<Vec<u8>> {
        self.get(hash).ok().flatten()
    }
}
