//! Postings metadata seam between the term dictionary and a postings
//! format.
//!
//! The block file treats per-term postings metadata as an opaque pair of
//! a fixed number of longs plus a byte blob; a [`PostingsCodec`] decides
//! what goes in them. Longs are delta-friendly: the first term of a block
//! is encoded absolutely, subsequent terms may be deltas against the
//! previous term.

use crate::error::{CamelliaError, Result};
use crate::util::bytes::BytesInput;

/// Per-field configuration the dictionary needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub number: u32,
    /// When false, terms carry only a document frequency and the field's
    /// total term frequency is unavailable.
    pub has_freqs: bool,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, number: u32, has_freqs: bool) -> Self {
        Self {
            name: name.into(),
            number,
            has_freqs,
        }
    }
}

/// Frequency statistics for a single term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TermStats {
    pub doc_freq: u32,
    /// Total occurrences across all documents. Ignored for fields without
    /// frequencies.
    pub total_term_freq: u64,
}

impl TermStats {
    pub fn new(doc_freq: u32, total_term_freq: u64) -> Self {
        Self {
            doc_freq,
            total_term_freq,
        }
    }
}

/// Location of a term's postings, as understood by [`SimplePostingsCodec`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TermMeta {
    /// Start offset of the postings in the postings file.
    pub postings_fp: u64,
    /// Length of the postings in bytes.
    pub postings_len: u64,
}

/// Encodes and decodes per-term postings metadata.
pub trait PostingsCodec: Send + Sync {
    /// Number of metadata longs per term. Fixed for the life of a file.
    fn longs_size(&self) -> usize;

    fn term_writer(&self) -> Box<dyn TermMetaWriter>;

    fn term_reader(&self) -> Box<dyn TermMetaReader>;
}

/// Per-field encoder. `absolute` is true for the first term of each block.
pub trait TermMetaWriter {
    fn encode_term(
        &mut self,
        meta: &TermMeta,
        longs: &mut [u64],
        bytes: &mut Vec<u8>,
        absolute: bool,
    ) -> Result<()>;

    /// Reset delta state at a field boundary.
    fn start_field(&mut self);
}

/// Per-enumerator decoder; `state` accumulates deltas across terms.
pub trait TermMetaReader {
    fn decode_term(
        &mut self,
        longs: &[u64],
        bytes: &mut BytesInput,
        state: &mut TermMeta,
        absolute: bool,
    ) -> Result<()>;
}

/// Stores one long (the postings file pointer, delta-coded within a block)
/// and the postings byte length in the byte blob.
#[derive(Debug, Default, Clone)]
pub struct SimplePostingsCodec;

impl SimplePostingsCodec {
    pub fn new() -> Self {
        Self
    }
}

impl PostingsCodec for SimplePostingsCodec {
    fn longs_size(&self) -> usize {
        1
    }

    fn term_writer(&self) -> Box<dyn TermMetaWriter> {
        Box::new(SimpleMetaWriter { last_fp: 0 })
    }

    fn term_reader(&self) -> Box<dyn TermMetaReader> {
        Box::new(SimpleMetaReader)
    }
}

struct SimpleMetaWriter {
    last_fp: u64,
}

impl TermMetaWriter for SimpleMetaWriter {
    fn encode_term(
        &mut self,
        meta: &TermMeta,
        longs: &mut [u64],
        bytes: &mut Vec<u8>,
        absolute: bool,
    ) -> Result<()> {
        if absolute {
            longs[0] = meta.postings_fp;
        } else {
            if meta.postings_fp < self.last_fp {
                return Err(CamelliaError::illegal_state(format!(
                    "postings pointer went backwards: {} after {}",
                    meta.postings_fp, self.last_fp
                )));
            }
            longs[0] = meta.postings_fp - self.last_fp;
        }
        self.last_fp = meta.postings_fp;
        crate::util::varint::encode_u64(meta.postings_len, bytes);
        Ok(())
    }

    fn start_field(&mut self) {
        self.last_fp = 0;
    }
}

struct SimpleMetaReader;

impl TermMetaReader for SimpleMetaReader {
    fn decode_term(
        &mut self,
        longs: &[u64],
        bytes: &mut BytesInput,
        state: &mut TermMeta,
        absolute: bool,
    ) -> Result<()> {
        if absolute {
            state.postings_fp = longs[0];
        } else {
            state.postings_fp += longs[0];
        }
        state.postings_len = bytes.read_vlong()?;
        Ok(())
    }
}
