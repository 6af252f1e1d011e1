//! Writer for the block terms dictionary file.

use log::debug;

use crate::codec::block_terms::{CODEC_NAME, VERSION_CURRENT};
use crate::codec::format;
use crate::codec::postings::{FieldInfo, PostingsCodec, TermMeta, TermMetaWriter, TermStats};
use crate::codec::terms_index::TermsIndexWriter;
use crate::error::{CamelliaError, Result};
use crate::storage::structured::StructWriter;
use crate::storage::{Storage, StorageOutput};
use crate::util::varint;

struct PendingTerm {
    term: Vec<u8>,
    stats: TermStats,
    meta: TermMeta,
}

struct FieldMeta {
    info: FieldInfo,
    num_terms: u64,
    terms_start: u64,
    sum_total_term_freq: u64,
    sum_doc_freq: u64,
    doc_count: u32,
}

struct FieldState {
    info: FieldInfo,
    terms_start: u64,
    num_terms: u64,
    sum_total_term_freq: u64,
    sum_doc_freq: u64,
    pending: Vec<PendingTerm>,
    /// Last term of the previous block; block prefixes are computed
    /// against it so the reader can carry term bytes across blocks.
    last_prev_term: Vec<u8>,
    last_term: Vec<u8>,
}

/// Writes one field at a time, terms in ascending byte order. The terms
/// index writer decides block boundaries and records block start offsets
/// as it goes.
pub struct BlockTermsWriter {
    out: StructWriter<Box<dyn StorageOutput>>,
    index_writer: Box<dyn TermsIndexWriter>,
    meta_writer: Box<dyn TermMetaWriter>,
    longs_size: usize,
    name: String,
    fields: Vec<FieldMeta>,
    current: Option<FieldState>,
    closed: bool,
}

impl BlockTermsWriter {
    pub fn new(
        storage: &dyn Storage,
        name: &str,
        index_writer: Box<dyn TermsIndexWriter>,
        postings: &dyn PostingsCodec,
    ) -> Result<Self> {
        let output = storage.create_output(name)?;
        let mut out = StructWriter::new(output);
        if let Err(err) = format::write_header(&mut out, CODEC_NAME, VERSION_CURRENT) {
            let _ = out.get_mut().close();
            return Err(err);
        }
        Ok(Self {
            out,
            index_writer,
            meta_writer: postings.term_writer(),
            longs_size: postings.longs_size(),
            name: name.to_string(),
            fields: Vec::new(),
            current: None,
            closed: false,
        })
    }

    pub fn start_field(&mut self, info: FieldInfo) -> Result<()> {
        self.check_open()?;
        if self.current.is_some() {
            return Err(CamelliaError::illegal_state(
                "previous field was not finished",
            ));
        }
        if self.fields.iter().any(|f| f.info.number == info.number) {
            return Err(CamelliaError::illegal_state(format!(
                "field number {} was already written",
                info.number
            )));
        }
        let terms_start = self.out.position();
        self.meta_writer.start_field();
        self.index_writer.start_field(&info, terms_start)?;
        self.current = Some(FieldState {
            info,
            terms_start,
            num_terms: 0,
            sum_total_term_freq: 0,
            sum_doc_freq: 0,
            pending: Vec::new(),
            last_prev_term: Vec::new(),
            last_term: Vec::new(),
        });
        Ok(())
    }

    pub fn write_term(&mut self, term: &[u8], stats: TermStats, meta: TermMeta) -> Result<()> {
        self.check_open()?;
        {
            let Some(state) = self.current.as_ref() else {
                return Err(CamelliaError::illegal_state("no field started"));
            };
            if state.num_terms > 0 && term <= state.last_term.as_slice() {
                return Err(CamelliaError::illegal_state(format!(
                    "terms out of order: {:?} after {:?}",
                    term, state.last_term
                )));
            }
        }
        if stats.doc_freq == 0 {
            return Err(CamelliaError::illegal_state(
                "term has a document frequency of 0",
            ));
        }

        if self.index_writer.check_index_term(term, &stats)? {
            self.flush_block()?;
            let fp = self.out.position();
            self.index_writer.add_index_term(term, fp)?;
        }

        let Some(state) = self.current.as_mut() else {
            return Err(CamelliaError::illegal_state("no field started"));
        };
        state.pending.push(PendingTerm {
            term: term.to_vec(),
            stats,
            meta,
        });
        state.last_term.clear();
        state.last_term.extend_from_slice(term);
        state.num_terms += 1;
        state.sum_doc_freq += u64::from(stats.doc_freq);
        if state.info.has_freqs {
            state.sum_total_term_freq += stats.total_term_freq;
        }
        Ok(())
    }

    /// Flushes the last block, writes the end-of-field marker, and records
    /// the field's directory entry. `doc_count` is the number of documents
    /// with at least one term in this field.
    pub fn finish_field(&mut self, doc_count: u32) -> Result<()> {
        self.check_open()?;
        self.flush_block()?;
        let Some(state) = self.current.take() else {
            return Err(CamelliaError::illegal_state("no field started"));
        };
        self.out.write_vint(0)?;
        self.index_writer.finish_field()?;
        if state.num_terms > 0 {
            debug!(
                "finished field {:?}: {} terms, {} docs",
                state.info.name, state.num_terms, doc_count
            );
            self.fields.push(FieldMeta {
                info: state.info,
                num_terms: state.num_terms,
                terms_start: state.terms_start,
                sum_total_term_freq: state.sum_total_term_freq,
                sum_doc_freq: state.sum_doc_freq,
                doc_count,
            });
        }
        Ok(())
    }

    /// Writes the field directory, trailer, and footer, then closes both
    /// the terms file and the index file.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.current.is_some() {
            return Err(CamelliaError::illegal_state(
                "close called with an unfinished field",
            ));
        }
        self.closed = true;
        let dir_start = self.out.position();
        self.out.write_vint(self.fields.len() as u32)?;
        for field in &self.fields {
            self.out.write_vint(field.info.number)?;
            self.out.write_vlong(field.num_terms)?;
            self.out.write_vlong(field.terms_start)?;
            if field.info.has_freqs {
                self.out.write_vlong(field.sum_total_term_freq)?;
            }
            self.out.write_vlong(field.sum_doc_freq)?;
            self.out.write_vint(field.doc_count)?;
            self.out.write_vint(self.longs_size as u32)?;
        }
        self.out.write_u64(dir_start)?;
        format::write_footer(&mut self.out)?;
        self.out.flush()?;
        self.out.get_mut().close()?;
        self.index_writer.finish()?;
        debug!("wrote term dictionary {}: {} fields", self.name, self.fields.len());
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(CamelliaError::illegal_state("writer is closed"));
        }
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        let Some(state) = self.current.as_mut() else {
            return Ok(());
        };
        if state.pending.is_empty() {
            return Ok(());
        }

        // the common prefix must also be shared with the last term of the
        // previous block: the reader keeps those bytes in its term buffer
        // when it crosses a block boundary
        let mut common = shared_prefix(&state.last_prev_term, &state.pending[0].term);
        for pending in &state.pending[1..] {
            common = common.min(shared_prefix(&state.last_prev_term, &pending.term));
        }

        self.out.write_vint(state.pending.len() as u32)?;
        self.out.write_vint(common as u32)?;

        let mut blob = Vec::new();
        for pending in &state.pending {
            varint::encode_u64((pending.term.len() - common) as u64, &mut blob);
            blob.extend_from_slice(&pending.term[common..]);
        }
        self.out.write_vint(blob.len() as u32)?;
        self.out.write_bytes(&blob)?;

        blob.clear();
        for pending in &state.pending {
            varint::encode_u64(u64::from(pending.stats.doc_freq), &mut blob);
            if state.info.has_freqs {
                let delta = pending
                    .stats
                    .total_term_freq
                    .checked_sub(u64::from(pending.stats.doc_freq))
                    .ok_or_else(|| {
                        CamelliaError::illegal_state(
                            "total term frequency is below the document frequency",
                        )
                    })?;
                varint::encode_u64(delta, &mut blob);
            }
        }
        self.out.write_vint(blob.len() as u32)?;
        self.out.write_bytes(&blob)?;

        blob.clear();
        let mut longs = vec![0u64; self.longs_size];
        let mut opaque = Vec::new();
        for (i, pending) in state.pending.iter().enumerate() {
            opaque.clear();
            self.meta_writer
                .encode_term(&pending.meta, &mut longs, &mut opaque, i == 0)?;
            for &value in &longs {
                varint::encode_u64(value, &mut blob);
            }
            blob.extend_from_slice(&opaque);
        }
        self.out.write_vint(blob.len() as u32)?;
        self.out.write_bytes(&blob)?;

        if let Some(last) = state.pending.last() {
            state.last_prev_term.clear();
            state.last_prev_term.extend_from_slice(&last.term);
        }
        state.pending.clear();
        Ok(())
    }
}

impl Drop for BlockTermsWriter {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}

fn shared_prefix(a: &[u8], b: &[u8]) -> usize {
    let limit = a.len().min(b.len());
    let mut i = 0;
    while i < limit && a[i] == b[i] {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::postings::SimplePostingsCodec;
    use crate::codec::terms_index::FixedGapTermsIndexWriter;
    use crate::storage::{MemoryStorage, Storage};

    fn writer(storage: &MemoryStorage) -> BlockTermsWriter {
        let index = FixedGapTermsIndexWriter::new(storage, "s.tii", 4).unwrap();
        BlockTermsWriter::new(storage, "s.tib", Box::new(index), &SimplePostingsCodec::new())
            .unwrap()
    }

    #[test]
    fn test_terms_must_be_ascending() {
        let storage = MemoryStorage::new();
        let mut w = writer(&storage);
        w.start_field(FieldInfo::new("body", 0, true)).unwrap();
        w.write_term(b"beta", TermStats::new(1, 1), TermMeta::default())
            .unwrap();
        let err = w.write_term(b"alpha", TermStats::new(1, 1), TermMeta::default());
        assert!(err.is_err());
        let err = w.write_term(b"beta", TermStats::new(1, 1), TermMeta::default());
        assert!(err.is_err());
        w.finish_field(1).unwrap();
        w.close().unwrap();
    }

    #[test]
    fn test_zero_doc_freq_rejected() {
        let storage = MemoryStorage::new();
        let mut w = writer(&storage);
        w.start_field(FieldInfo::new("body", 0, true)).unwrap();
        assert!(w
            .write_term(b"a", TermStats::new(0, 0), TermMeta::default())
            .is_err());
        w.finish_field(0).unwrap();
        w.close().unwrap();
    }

    #[test]
    fn test_write_term_requires_field() {
        let storage = MemoryStorage::new();
        let mut w = writer(&storage);
        assert!(w
            .write_term(b"a", TermStats::new(1, 1), TermMeta::default())
            .is_err());
        w.close().unwrap();
    }

    #[test]
    fn test_close_produces_both_files() {
        let storage = MemoryStorage::new();
        let mut w = writer(&storage);
        w.start_field(FieldInfo::new("body", 0, true)).unwrap();
        for (i, term) in [b"apple", b"berry", b"lemon", b"mango", b"peach"]
            .iter()
            .enumerate()
        {
            w.write_term(
                &term[..],
                TermStats::new(2, 5),
                TermMeta {
                    postings_fp: i as u64 * 100,
                    postings_len: 10,
                },
            )
            .unwrap();
        }
        w.finish_field(3).unwrap();
        w.close().unwrap();
        assert!(storage.file_exists("s.tib"));
        assert!(storage.file_exists("s.tii"));
    }
}
