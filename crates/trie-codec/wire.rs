use std::io::{Read, Write};

use crate::error::CodecError;

pub const MAGIC_LIVE: &[u8] = b"Fantom-World-State";
pub const MAGIC_ARCH: &[u8] = b"Fantom-Archive-State";
pub const VERSION: u8 = 1;

/// The only hash scheme currently defined; the byte is still on the wire
/// so a future scheme can be added without a format break.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum HashType {
    StateRoot = 0,
}

impl HashType {
    pub fn from_u8(tag: u8) -> Result<Self, CodecError> {
        match tag {
            0 => Ok(HashType::StateRoot),
            other => Err(CodecError::UnsupportedHashType(other)),
        }
    }
}

pub fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), CodecError> {
    reader.read_exact(buf).map_err(CodecError::from)
}

pub fn read_u8<R: Read>(reader: &mut R) -> Result<u8, CodecError> {
    let mut buf = [0u8; 1];
    read_exact(reader, &mut buf)?;
    Ok(buf[0])
}

/// Reads a single token byte, translating EOF into `None` so callers can
/// distinguish "end of stream" from "I/O failure".
pub fn read_token<R: Read>(reader: &mut R) -> Result<Option<u8>, CodecError> {
    let mut buf = [0u8; 1];
    match reader.read(&mut buf) {
        Ok(0) => Ok(None),
        Ok(_) => Ok(Some(buf[0])),
        Err(e) => Err(CodecError::from(e)),
    }
}

pub fn read_u32<R: Read>(reader: &mut R) -> Result<u32, CodecError> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

pub fn read_u64<R: Read>(reader: &mut R) -> Result<u64, CodecError> {
    let mut buf = [0u8; 8];
    read_exact(reader, &mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

pub fn read_u16<R: Read>(reader: &mut R) -> Result<u16, CodecError> {
    let mut buf = [0u8; 2];
    read_exact(reader, &mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

pub fn read_array<const N: usize, R: Read>(reader: &mut R) -> Result<[u8; N], CodecError> {
    let mut buf = [0u8; N];
    read_exact(reader, &mut buf)?;
    Ok(buf)
}

pub fn read_vec<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>, CodecError> {
    let mut buf = vec![0u8; len];
    read_exact(reader, &mut buf)?;
    Ok(buf)
}

pub fn write_all<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<(), CodecError> {
    writer.write_all(bytes).map_err(CodecError::from)
}

pub fn write_u8<W: Write>(writer: &mut W, value: u8) -> Result<(), CodecError> {
    write_all(writer, &[value])
}

pub fn write_u16<W: Write>(writer: &mut W, value: u16) -> Result<(), CodecError> {
    write_all(writer, &value.to_be_bytes())
}

pub fn write_u32<W: Write>(writer: &mut W, value: u32) -> Result<(), CodecError> {
    write_all(writer, &value.to_be_bytes())
}

pub fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<(), CodecError> {
    write_all(writer, &value.to_be_bytes())
}

/// Reads and checks the live-snapshot magic, producing a specific
/// diagnostic if the stream is actually an archive diff stream.
pub fn expect_live_magic<R: Read>(reader: &mut R) -> Result<(), CodecError> {
    let mut probe = vec![0u8; MAGIC_LIVE.len()];
    read_exact(reader, &mut probe)?;
    if probe == MAGIC_LIVE {
        return Ok(());
    }
    let mut rest = vec![0u8; MAGIC_ARCH.len() - MAGIC_LIVE.len()];
    if read_exact(reader, &mut rest).is_ok() {
        probe.extend_from_slice(&rest);
        if probe == MAGIC_ARCH {
            return Err(CodecError::ArchiveMagicInLiveContext);
        }
    }
    Err(CodecError::BadMagic)
}

/// Reads and checks the archive-stream magic, producing a specific
/// diagnostic if the stream is actually a live snapshot.
pub fn expect_archive_magic<R: Read>(reader: &mut R) -> Result<(), CodecError> {
    let mut probe = vec![0u8; MAGIC_ARCH.len()];
    read_exact(reader, &mut probe)?;
    if probe == MAGIC_ARCH {
        return Ok(());
    }
    if &probe[..MAGIC_LIVE.len()] == MAGIC_LIVE {
        return Err(CodecError::LiveMagicInArchiveContext);
    }
    Err(CodecError::BadMagic)
}

pub fn expect_version<R: Read>(reader: &mut R) -> Result<(), CodecError> {
    let version = read_u8(reader)?;
    if version != VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    Ok(())
}
