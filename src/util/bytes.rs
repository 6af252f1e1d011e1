//! Byte-slice cursor used to decode per-block metadata blobs.

use crate::error::{CamelliaError, Result};
use crate::util::varint;

/// An owned byte buffer with a read cursor.
///
/// Block decoding reads whole blobs (term suffixes, frequencies, postings
/// metadata) off disk into these buffers, then decodes lazily. `reset`
/// reuses the allocation across blocks.
#[derive(Debug, Default)]
pub struct BytesInput {
    data: Vec<u8>,
    pos: usize,
}

impl BytesInput {
    pub fn new() -> Self {
        BytesInput::default()
    }

    /// Replace the buffer contents and rewind the cursor.
    ///
    /// The buffer is resized to `len` so the caller can read directly into
    /// `buf_mut()`.
    pub fn reset(&mut self, len: usize) -> &mut [u8] {
        self.data.resize(len, 0);
        self.pos = 0;
        &mut self.data[..]
    }

    /// Current cursor position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Whether the cursor has consumed the whole buffer.
    pub fn exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Borrow the remaining unread bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    pub fn read_vint(&mut self) -> Result<u32> {
        let v = self.read_vlong()?;
        u32::try_from(v).map_err(|_| CamelliaError::corrupt(format!("vint out of range: {v}")))
    }

    pub fn read_vlong(&mut self) -> Result<u64> {
        let (value, consumed) = varint::decode_u64(&self.data[self.pos..])?;
        self.pos += consumed;
        Ok(value)
    }

    pub fn read_bytes(&mut self, out: &mut [u8]) -> Result<()> {
        let end = self.pos + out.len();
        if end > self.data.len() {
            return Err(CamelliaError::corrupt(format!(
                "blob truncated: need {} bytes at position {}, have {}",
                out.len(),
                self.pos,
                self.data.len() - self.pos
            )));
        }
        out.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    /// Read `len` bytes starting at the cursor without copying.
    pub fn read_slice(&mut self, len: usize) -> Result<&[u8]> {
        let end = self.pos + len;
        if end > self.data.len() {
            return Err(CamelliaError::corrupt(format!(
                "blob truncated: need {} bytes at position {}, have {}",
                len,
                self.pos,
                self.data.len() - self.pos
            )));
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        let end = self.pos + len;
        if end > self.data.len() {
            return Err(CamelliaError::corrupt(format!(
                "blob truncated: cannot skip {len} bytes at position {}",
                self.pos
            )));
        }
        self.pos = end;
        Ok(())
    }
}
