//! Fixed-bit-width packed integer arrays.
//!
//! The fixed-gap terms index collects raw u64 values (file-pointer deltas,
//! blob offsets) into plain vectors while writing, then finalizes them into
//! an immutable [`PackedLongs`] using the minimal bit width that fits the
//! largest value. Collection and packing are deliberately two distinct
//! phases with two distinct types.

use std::io::{Read, Seek, Write};

use crate::error::{CamelliaError, Result};
use crate::storage::structured::{StructReader, StructWriter};

/// An immutable array of u64 values stored at a fixed bit width.
#[derive(Debug, Clone)]
pub struct PackedLongs {
    bits_per_value: u32,
    len: usize,
    words: Vec<u64>,
}

impl PackedLongs {
    /// Pack a slice of raw values at the minimal bit width.
    pub fn from_slice(values: &[u64]) -> Self {
        let max = values.iter().copied().max().unwrap_or(0);
        let bits_per_value = if max == 0 { 1 } else { 64 - max.leading_zeros() };
        let word_count = (values.len() * bits_per_value as usize).div_ceil(64);
        let mut words = vec![0u64; word_count];

        for (i, &v) in values.iter().enumerate() {
            let bit_pos = i * bits_per_value as usize;
            let word = bit_pos / 64;
            let shift = bit_pos % 64;
            words[word] |= v << shift;
            let spill = shift + bits_per_value as usize;
            if spill > 64 {
                words[word + 1] |= v >> (64 - shift);
            }
        }

        PackedLongs {
            bits_per_value,
            len: values.len(),
            words,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bits_per_value(&self) -> u32 {
        self.bits_per_value
    }

    /// Read the value at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn get(&self, index: usize) -> u64 {
        assert!(index < self.len, "index {index} out of bounds ({})", self.len);
        let bits = self.bits_per_value as usize;
        let mask = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };
        let bit_pos = index * bits;
        let word = bit_pos / 64;
        let shift = bit_pos % 64;
        let mut value = self.words[word] >> shift;
        if shift + bits > 64 {
            value |= self.words[word + 1] << (64 - shift);
        }
        value & mask
    }

    /// Serialize: bits-per-value, length, raw words.
    pub fn write_to<W: Write>(&self, writer: &mut StructWriter<W>) -> Result<()> {
        writer.write_vint(self.bits_per_value)?;
        writer.write_vlong(self.len as u64)?;
        for &word in &self.words {
            writer.write_u64(word)?;
        }
        Ok(())
    }

    /// Deserialize a previously written array.
    pub fn read_from<R: Read + Seek>(reader: &mut StructReader<R>) -> Result<Self> {
        let bits_per_value = reader.read_vint()?;
        if bits_per_value == 0 || bits_per_value > 64 {
            return Err(CamelliaError::corrupt(format!(
                "invalid packed bits-per-value: {bits_per_value}"
            )));
        }
        let len = reader.read_vlong()? as usize;
        let word_count = (len * bits_per_value as usize).div_ceil(64);
        let mut words = Vec::with_capacity(word_count);
        for _ in 0..word_count {
            words.push(reader.read_u64()?);
        }
        Ok(PackedLongs {
            bits_per_value,
            len,
            words,
        })
    }
}
