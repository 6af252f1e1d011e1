//! File headers, footers, and checksum verification.
//!
//! Every codec file starts with a header (magic, codec name, version) and
//! ends with a fixed-size footer carrying a CRC32 of everything that
//! precedes the checksum field. Readers validate both before trusting any
//! payload bytes.

use std::io::{Read, Seek, Write};

use crate::error::{CamelliaError, Result};
use crate::storage::structured::{StructReader, StructWriter};

pub const CODEC_MAGIC: u32 = 0x434D_4C41;
pub const FOOTER_MAGIC: u32 = !CODEC_MAGIC;

/// Footer magic + checksum algorithm id + 64-bit checksum.
pub const FOOTER_LENGTH: u64 = 4 + 4 + 8;

/// Writes the file header: magic, codec name, format version.
pub fn write_header<W: Write>(
    writer: &mut StructWriter<W>,
    codec: &str,
    version: u32,
) -> Result<()> {
    writer.write_u32(CODEC_MAGIC)?;
    writer.write_string(codec)?;
    writer.write_u32(version)
}

/// Reads and validates a file header, returning the version found.
pub fn check_header<R: Read + Seek>(
    reader: &mut StructReader<R>,
    codec: &str,
    min_version: u32,
    max_version: u32,
) -> Result<u32> {
    let magic = reader.read_u32()?;
    if magic != CODEC_MAGIC {
        return Err(CamelliaError::corrupt(format!(
            "codec magic mismatch: expected {CODEC_MAGIC:#x}, found {magic:#x}"
        )));
    }
    let name = reader.read_string()?;
    if name != codec {
        return Err(CamelliaError::corrupt(format!(
            "codec name mismatch: expected {codec}, found {name}"
        )));
    }
    let version = reader.read_u32()?;
    if version < min_version || version > max_version {
        return Err(CamelliaError::corrupt(format!(
            "unsupported version {version} for codec {codec} (supported: {min_version}..={max_version})"
        )));
    }
    Ok(version)
}

/// Writes the file footer. Must be the last write on the file.
pub fn write_footer<W: Write>(writer: &mut StructWriter<W>) -> Result<()> {
    writer.write_u32(FOOTER_MAGIC)?;
    writer.write_u32(0)?;
    let checksum = writer.checksum();
    writer.write_u64(checksum)
}

/// Validates the footer structure and recomputes the checksum over the
/// whole file. Returns the stored checksum on success. Leaves the reader
/// positioned at the end of the file.
pub fn verify_checksum<R: Read + Seek>(reader: &mut StructReader<R>) -> Result<u64> {
    let len = reader.len()?;
    if len < FOOTER_LENGTH {
        return Err(CamelliaError::corrupt(format!(
            "file is too short to hold a footer: {len} bytes"
        )));
    }

    reader.seek(0)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut remaining = len - 8;
    let mut buf = [0u8; 8192];
    while remaining > 0 {
        let n = (buf.len() as u64).min(remaining) as usize;
        reader.read_bytes(&mut buf[..n])?;
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }
    let actual = hasher.finalize() as u64;

    reader.seek(len - FOOTER_LENGTH)?;
    let magic = reader.read_u32()?;
    if magic != FOOTER_MAGIC {
        return Err(CamelliaError::corrupt(format!(
            "footer magic mismatch: expected {FOOTER_MAGIC:#x}, found {magic:#x}"
        )));
    }
    let algorithm = reader.read_u32()?;
    if algorithm != 0 {
        return Err(CamelliaError::corrupt(format!(
            "unknown checksum algorithm: {algorithm}"
        )));
    }
    let stored = reader.read_u64()?;
    if stored != actual {
        return Err(CamelliaError::corrupt(format!(
            "checksum mismatch: stored {stored:#x}, computed {actual:#x}"
        )));
    }
    Ok(stored)
}
