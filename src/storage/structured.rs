//! Primitive readers and writers for index files.
//!
//! [`StructWriter`] wraps any [`Write`] sink, tracks its own byte position
//! (all file formats here are append-only) and keeps a running CRC32 over
//! everything written so footers can be emitted without a second pass.
//! [`StructReader`] wraps any seekable source. Multi-byte integers are
//! little-endian; variable-length integers use the common 7-bits-per-byte
//! encoding from [`crate::util::varint`].

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{CamelliaError, Result};

/// Buffered, position-tracking writer for index files.
pub struct StructWriter<W: Write> {
    out: W,
    hasher: crc32fast::Hasher,
    pos: u64,
}

impl<W: Write> StructWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            hasher: crc32fast::Hasher::new(),
            pos: 0,
        }
    }

    /// Number of bytes written so far.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Running CRC32 of all bytes written so far, widened to match the
    /// on-disk footer field.
    pub fn checksum(&self) -> u64 {
        self.hasher.clone().finalize() as u64
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes)?;
        self.hasher.update(bytes);
        self.pos += bytes.len() as u64;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        let mut buf = [0u8; 4];
        (&mut buf[..]).write_u32::<LittleEndian>(value)?;
        self.write_bytes(&buf)
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        let mut buf = [0u8; 8];
        (&mut buf[..]).write_u64::<LittleEndian>(value)?;
        self.write_bytes(&buf)
    }

    pub fn write_vint(&mut self, value: u32) -> Result<()> {
        self.write_vlong(value as u64)
    }

    pub fn write_vlong(&mut self, value: u64) -> Result<()> {
        let mut buf = Vec::with_capacity(10);
        crate::util::varint::encode_u64(value, &mut buf);
        self.write_bytes(&buf)
    }

    /// Length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_vint(value.len() as u32)?;
        self.write_bytes(value.as_bytes())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Seekable reader for index files.
pub struct StructReader<R: Read + Seek> {
    input: R,
}

impl<R: Read + Seek> StructReader<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.input.stream_position()?)
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.input.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    /// Length of the underlying file.
    pub fn len(&mut self) -> Result<u64> {
        let here = self.input.stream_position()?;
        let end = self.input.seek(SeekFrom::End(0))?;
        self.input.seek(SeekFrom::Start(here))?;
        Ok(end)
    }

    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.input.read_exact(buf)?;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.input.read_u8()?)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.input.read_u32::<LittleEndian>()?)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(self.input.read_u64::<LittleEndian>()?)
    }

    pub fn read_vint(&mut self) -> Result<u32> {
        let value = self.read_vlong()?;
        u32::try_from(value)
            .map_err(|_| CamelliaError::corrupt("vint does not fit in 32 bits"))
    }

    pub fn read_vlong(&mut self) -> Result<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            if shift > 63 {
                return Err(CamelliaError::corrupt("vlong is too long"));
            }
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    /// Length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_vint()? as usize;
        let mut buf = vec![0u8; len];
        self.read_bytes(&mut buf)?;
        String::from_utf8(buf).map_err(|_| CamelliaError::corrupt("string is not valid UTF-8"))
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.input
    }

    pub fn into_inner(self) -> R {
        self.input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_primitives_round_trip() {
        let mut writer = StructWriter::new(Vec::new());
        writer.write_u8(0xAB).unwrap();
        writer.write_u32(0xDEAD_BEEF).unwrap();
        writer.write_u64(u64::MAX - 1).unwrap();
        writer.write_vint(300).unwrap();
        writer.write_vlong(1 << 40).unwrap();
        writer.write_string("term dictionary").unwrap();
        assert_eq!(writer.position(), 1 + 4 + 8 + 2 + 6 + 1 + 15);

        let buf = writer.into_inner();
        let mut reader = StructReader::new(Cursor::new(buf));
        assert_eq!(reader.read_u8().unwrap(), 0xAB);
        assert_eq!(reader.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.read_u64().unwrap(), u64::MAX - 1);
        assert_eq!(reader.read_vint().unwrap(), 300);
        assert_eq!(reader.read_vlong().unwrap(), 1 << 40);
        assert_eq!(reader.read_string().unwrap(), "term dictionary");
    }

    #[test]
    fn test_checksum_tracks_all_bytes() {
        let mut writer = StructWriter::new(Vec::new());
        writer.write_bytes(b"abcdef").unwrap();
        let expected = {
            let mut h = crc32fast::Hasher::new();
            h.update(b"abcdef");
            h.finalize() as u64
        };
        assert_eq!(writer.checksum(), expected);
    }

    #[test]
    fn test_seek_and_len() {
        let mut writer = StructWriter::new(Vec::new());
        writer.write_u32(7).unwrap();
        writer.write_u32(11).unwrap();
        let buf = writer.into_inner();

        let mut reader = StructReader::new(Cursor::new(buf));
        assert_eq!(reader.len().unwrap(), 8);
        reader.seek(4).unwrap();
        assert_eq!(reader.read_u32().unwrap(), 11);
        assert_eq!(reader.position().unwrap(), 8);
    }

    #[test]
    fn test_vint_too_large() {
        let mut writer = StructWriter::new(Vec::new());
        writer.write_vlong(u64::from(u32::MAX) + 1).unwrap();
        let buf = writer.into_inner();
        let mut reader = StructReader::new(Cursor::new(buf));
        assert!(reader.read_vint().is_err());
    }
}
