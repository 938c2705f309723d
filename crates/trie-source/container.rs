use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::SourceError;

/// A single append-only, fixed-record container file: an array of
/// same-sized encoded records addressed by `index * record_size`.
///
/// Each [`Container`] owns one independent file descriptor, so two sources
/// opened against the same directory never contend on a shared handle —
/// the concurrency model §4.1 calls for is "one Node Source per worker",
/// not "one shared reader".
pub struct Container {
    name: &'static str,
    path: PathBuf,
    file: File,
    record_size: u64,
}

impl Container {
    pub fn open(dir: &Path, name: &'static str, record_size: usize) -> Result<Self, SourceError> {
        let path = dir.join(name).join("values.dat");
        let file = File::open(&path).map_err(|source| SourceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self {
            name,
            path,
            file,
            record_size: record_size as u64,
        })
    }

    /// Reads the record at `index`, returning exactly `record_size` bytes.
    pub fn read(&mut self, index: u64) -> Result<Vec<u8>, SourceError> {
        let offset = index
            .checked_mul(self.record_size)
            .expect("record offset overflowed u64");
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|source| SourceError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        let mut buf = vec![0u8; self.record_size as usize];
        let mut read_so_far = 0usize;
        while read_so_far < buf.len() {
            let n = self
                .file
                .read(&mut buf[read_so_far..])
                .map_err(|source| SourceError::Io {
                    path: self.path.display().to_string(),
                    source,
                })?;
            if n == 0 {
                return Err(SourceError::ShortRead {
                    container: self.name,
                    expected: offset + self.record_size,
                    found: offset + read_so_far as u64,
                });
            }
            read_so_far += n;
        }
        Ok(buf)
    }

    /// Flushes this container's file to disk and releases its descriptor.
    pub fn close(self) -> Result<(), SourceError> {
        self.file.sync_all().map_err(|source| SourceError::Io {
            path: self.path.display().to_string(),
            source,
        })
    }
}
